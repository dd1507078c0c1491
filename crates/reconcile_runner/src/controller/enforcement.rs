//! EnforcementLoop - Die Closed-Loop für ein einzelnes Gerät
//!
//! Pro Iteration:
//! 1. Hole aktuellen Zustand (OperationalState)
//! 2. Vergleiche mit dem Intent
//! 3. Bei Drift: kompletten Intent anwenden
//! 4. Warten (Intervall bzw. Backoff), dann von vorne
//!
//! Fehler innerhalb einer Iteration werden gemeldet, verlassen die Loop aber nie.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use crate::compliance::{detect_drift, is_compliant};
use crate::controller::handle::{ControlMessage, ReconcilerHandle};
use crate::state::{Intent, LoopState};
use crate::{DeviceBackend, LoopOptions, LoopReporter, ReconcilerError};

/// Ergebnis einer einzelnen Iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Gerät war compliant, nichts zu tun
    Compliant,
    /// Drift erkannt und Intent erfolgreich angewendet
    Converged,
    /// Drift erkannt, Apply fehlgeschlagen (Zustand unverändert)
    ApplyFailed,
    /// Zustand konnte nicht gelesen werden, kein Apply
    StateUnknown,
}

/// Zähler über die gesamte Laufzeit der Loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub applies: u64,
    pub apply_failures: u64,
    pub read_failures: u64,
}

/// Ergebnis der Wartephase
enum WaitResult {
    /// Nächste reguläre Iteration
    Continue,
    /// Loop beenden
    Stop,
}

/// Die Enforcement-Loop besitzt das Gerät exklusiv.
pub struct EnforcementLoop<B: DeviceBackend, R: LoopReporter> {
    backend: B,
    intent: Intent,
    options: LoopOptions,
    state: LoopState,
    reporter: R,
    summary: LoopSummary,
    tx: mpsc::UnboundedSender<ControlMessage>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl<B: DeviceBackend, R: LoopReporter> EnforcementLoop<B, R> {
    /// Erstellt eine neue Loop.
    pub fn new(backend: B, intent: Intent, options: LoopOptions, reporter: R) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            backend,
            intent,
            options,
            state: LoopState::new(),
            reporter,
            summary: LoopSummary::default(),
            tx,
            rx,
        }
    }

    /// Handle zum Steuern der Loop von anderen Tasks aus.
    pub fn handle(&self) -> ReconcilerHandle {
        ReconcilerHandle::new(self.tx.clone())
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// Führt die Loop aus, bis Shutdown kommt oder `max_iterations` erreicht ist.
    ///
    /// Ohne `max_iterations` und ohne Shutdown läuft die Loop für immer.
    /// `max_iterations: Some(0)` führt keine einzige Iteration aus.
    pub async fn run(mut self) -> LoopSummary {
        self.reporter.on_start(self.backend.name(), &self.intent);

        loop {
            if self.drain_pending().await || self.limit_reached() {
                break;
            }

            self.run_iteration().await;

            if self.limit_reached() {
                break;
            }

            match self.wait().await {
                WaitResult::Continue => continue,
                WaitResult::Stop => break,
            }
        }

        self.state.stop();
        self.reporter.on_stopped(&self.summary);
        self.summary
    }

    /// Führt genau eine Iteration aus (Checking, ggf. Applying, danach Idle).
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        self.state.begin_iteration();
        self.summary.iterations += 1;
        let iteration = self.state.iteration;
        self.reporter.on_iteration(iteration);

        let outcome = self.check_and_apply(iteration).await;
        self.state.finish_iteration();
        outcome
    }

    async fn check_and_apply(&mut self, iteration: u64) -> IterationOutcome {

        // Hole aktuellen Zustand
        let observed = match self.backend.read_state().await {
            Ok(observed) => observed,
            Err(err) => {
                // Unbekannter Zustand ist keine Drift
                self.summary.read_failures += 1;
                self.reporter.on_state_read_failed(iteration, &err);
                return IterationOutcome::StateUnknown;
            }
        };

        if is_compliant(&self.intent, &observed) {
            self.reporter.on_compliant(iteration, &observed);
            return IterationOutcome::Compliant;
        }

        let drift = detect_drift(&self.intent, &observed);
        self.reporter.on_drift(iteration, &drift);

        self.state.start_applying();
        let apply_timeout = self.options.apply_timeout;
        let result = match timeout(apply_timeout, self.backend.apply_intent(&self.intent)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcilerError::ApplyTimeout(apply_timeout)),
        };

        match result {
            Ok(new_state) => {
                self.state.record_apply_success();
                self.summary.applies += 1;
                self.reporter.on_applied(iteration, &new_state);
                IterationOutcome::Converged
            }
            Err(err) => {
                let failures = self.state.record_apply_failure();
                self.summary.apply_failures += 1;
                self.reporter.on_apply_failed(iteration, &err, failures);
                IterationOutcome::ApplyFailed
            }
        }
    }

    /// Wartezeit bis zur nächsten regulären Iteration.
    pub fn next_delay(&self) -> Duration {
        match &self.options.backoff {
            Some(policy) => policy.delay(self.options.interval, self.state.consecutive_failures),
            None => self.options.interval,
        }
    }

    fn limit_reached(&self) -> bool {
        self.options
            .max_iterations
            .is_some_and(|max| self.state.iteration >= max)
    }

    /// Bearbeitet Nachrichten, die außerhalb der Wartephase eingetroffen sind.
    ///
    /// Die Reihenfolge bleibt erhalten: ein `ReconcileNow` vor dem `Shutdown`
    /// wird noch beantwortet, alles danach verfällt und der Aufrufer bekommt
    /// `ChannelClosed`. Gibt `true` zurück, wenn die Loop enden soll.
    async fn drain_pending(&mut self) -> bool {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                ControlMessage::Shutdown => return true,
                ControlMessage::ReconcileNow { result_tx } => {
                    if self.limit_reached() {
                        return true;
                    }
                    let outcome = self.run_iteration().await;
                    let _ = result_tx.send(outcome);
                }
            }
        }
        false
    }

    /// Wartephase zwischen zwei Iterationen.
    ///
    /// Reagiert auf Nachrichten vom Handle; ein `ReconcileNow` startet das
    /// Intervall neu.
    async fn wait(&mut self) -> WaitResult {
        self.state.start_waiting();
        let delay = self.next_delay();
        self.reporter.on_waiting(delay);

        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            let msg = tokio::select! {
                _ = &mut timer => return WaitResult::Continue,
                msg = self.rx.recv() => msg,
            };

            match msg {
                Some(ControlMessage::Shutdown) | None => return WaitResult::Stop,
                Some(ControlMessage::ReconcileNow { result_tx }) => {
                    let outcome = self.run_iteration().await;
                    let _ = result_tx.send(outcome);

                    if self.limit_reached() {
                        return WaitResult::Stop;
                    }

                    self.state.start_waiting();
                    let delay = self.next_delay();
                    self.reporter.on_waiting(delay);
                    timer.as_mut().reset(Instant::now() + delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LoopPhase, OperationalState};
    use crate::test_utils::{drifted_state, sample_intent, MockDevice, MockReporter};
    use crate::BackoffPolicy;

    fn fast_options() -> LoopOptions {
        LoopOptions {
            interval: Duration::from_millis(5),
            apply_timeout: Duration::from_millis(200),
            backoff: None,
            max_iterations: None,
        }
    }

    fn make_loop(device: MockDevice) -> EnforcementLoop<MockDevice, MockReporter> {
        EnforcementLoop::new(device, sample_intent(), fast_options(), MockReporter::new())
    }

    #[tokio::test]
    async fn test_iteration_converges_drifted_device() {
        let device = MockDevice::new("router1", drifted_state());
        let mut enforcement = make_loop(device.clone());

        let outcome = enforcement.run_iteration().await;

        assert_eq!(outcome, IterationOutcome::Converged);
        assert_eq!(device.apply_calls(), 1);
        assert_eq!(device.state(), OperationalState::from(&sample_intent()));
        assert_eq!(enforcement.summary().applies, 1);
    }

    #[tokio::test]
    async fn test_iteration_skips_apply_when_compliant() {
        let device = MockDevice::new("router1", OperationalState::from(&sample_intent()));
        let mut enforcement = make_loop(device.clone());

        let outcome = enforcement.run_iteration().await;

        assert_eq!(outcome, IterationOutcome::Compliant);
        assert_eq!(device.read_calls(), 1);
        assert_eq!(device.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_is_not_drift() {
        let device = MockDevice::new("router1", drifted_state()).failing_reads(1);
        let mut enforcement = make_loop(device.clone());

        let outcome = enforcement.run_iteration().await;

        assert_eq!(outcome, IterationOutcome::StateUnknown);
        assert_eq!(device.apply_calls(), 0);
        assert_eq!(enforcement.summary().read_failures, 1);

        // Nächste Iteration liest erfolgreich und korrigiert
        let outcome = enforcement.run_iteration().await;
        assert_eq!(outcome, IterationOutcome::Converged);
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_state_untouched() {
        let device = MockDevice::new("router1", drifted_state()).failing_applies(1);
        let mut enforcement = make_loop(device.clone());

        let outcome = enforcement.run_iteration().await;

        assert_eq!(outcome, IterationOutcome::ApplyFailed);
        assert_eq!(device.state(), drifted_state());
        assert_eq!(enforcement.state().consecutive_failures, 1);
        assert!(enforcement
            .reporter()
            .events()
            .contains(&"apply_failed:1:1".to_string()));

        // Retry in der nächsten Iteration
        let outcome = enforcement.run_iteration().await;
        assert_eq!(outcome, IterationOutcome::Converged);
        assert_eq!(device.apply_calls(), 2);
        assert_eq!(enforcement.state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_apply_timeout_is_apply_failure() {
        let device =
            MockDevice::new("router1", drifted_state()).with_apply_delay(Duration::from_secs(5));
        let mut options = fast_options();
        options.apply_timeout = Duration::from_millis(20);
        let mut enforcement =
            EnforcementLoop::new(device.clone(), sample_intent(), options, MockReporter::new());

        let outcome = enforcement.run_iteration().await;

        assert_eq!(outcome, IterationOutcome::ApplyFailed);
        assert_eq!(device.state(), drifted_state());
        assert!(enforcement
            .reporter()
            .events()
            .iter()
            .any(|e| e.starts_with("apply_failed:1:")));
    }

    #[tokio::test]
    async fn test_drift_reported_per_field() {
        let device = MockDevice::new("router1", OperationalState::new("gnmi", 57777, true));
        let mut enforcement = make_loop(device);

        enforcement.run_iteration().await;

        let events = enforcement.reporter().events();
        assert!(events.contains(&"drift:1:port: 57777 -> 57400".to_string()));
    }

    #[tokio::test]
    async fn test_next_delay_uses_backoff() {
        let device = MockDevice::new("router1", drifted_state()).failing_applies(10);
        let mut options = fast_options();
        options.interval = Duration::from_secs(1);
        options.backoff = Some(BackoffPolicy::new(Duration::from_secs(3)));
        let mut enforcement =
            EnforcementLoop::new(device, sample_intent(), options, MockReporter::new());

        enforcement.run_iteration().await;
        assert_eq!(enforcement.next_delay(), Duration::from_secs(1));

        enforcement.run_iteration().await;
        assert_eq!(enforcement.next_delay(), Duration::from_secs(2));

        enforcement.run_iteration().await;
        assert_eq!(enforcement.next_delay(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_next_delay_without_backoff() {
        let device = MockDevice::new("router1", drifted_state()).failing_applies(10);
        let mut enforcement = make_loop(device);

        enforcement.run_iteration().await;
        enforcement.run_iteration().await;

        assert_eq!(enforcement.next_delay(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_run_stops_at_max_iterations() {
        let device = MockDevice::new("router1", drifted_state());
        let mut options = fast_options();
        options.max_iterations = Some(3);
        let reporter = MockReporter::new();
        let enforcement =
            EnforcementLoop::new(device.clone(), sample_intent(), options, reporter.clone());

        let summary = enforcement.run().await;

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.applies, 1);
        assert_eq!(device.apply_calls(), 1);
        assert_eq!(reporter.events().last().unwrap(), "stopped:3");
    }

    #[tokio::test]
    async fn test_zero_max_iterations_runs_nothing() {
        let device = MockDevice::new("router1", drifted_state());
        let mut options = fast_options();
        options.max_iterations = Some(0);
        let reporter = MockReporter::new();
        let enforcement =
            EnforcementLoop::new(device.clone(), sample_intent(), options, reporter.clone());

        let summary = enforcement.run().await;

        assert_eq!(summary, LoopSummary::default());
        assert_eq!(device.read_calls(), 0);
        assert_eq!(device.apply_calls(), 0);
        assert_eq!(
            reporter.events(),
            vec!["start:router1".to_string(), "stopped:0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let device = MockDevice::new("router1", drifted_state());
        let enforcement = make_loop(device.clone());
        enforcement.handle().shutdown().unwrap();

        let summary = enforcement.run().await;

        assert_eq!(summary.iterations, 0);
        assert_eq!(device.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting() {
        let device = MockDevice::new("router1", drifted_state());
        let mut options = fast_options();
        options.interval = Duration::from_secs(3600);
        let enforcement = EnforcementLoop::new(device, sample_intent(), options, MockReporter::new());
        let handle = enforcement.handle();

        let task = tokio::spawn(enforcement.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().unwrap();

        let summary = task.await.unwrap();
        assert_eq!(summary.iterations, 1);
    }

    #[tokio::test]
    async fn test_reconcile_now_runs_iteration() {
        let device = MockDevice::new("router1", drifted_state());
        let mut options = fast_options();
        options.interval = Duration::from_secs(3600);
        let enforcement =
            EnforcementLoop::new(device.clone(), sample_intent(), options, MockReporter::new());
        let handle = enforcement.handle();

        let task = tokio::spawn(enforcement.run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Erste Iteration korrigiert bereits, danach ist das Gerät compliant
        let outcome = handle.reconcile_now().await.unwrap();
        assert_eq!(outcome, IterationOutcome::Compliant);

        // Externe Änderung führt wieder zu Drift
        device.set_state(drifted_state());
        let outcome = handle.reconcile_now().await.unwrap();
        assert_eq!(outcome, IterationOutcome::Converged);

        handle.shutdown().unwrap();
        let summary = task.await.unwrap();

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.applies, 2);
    }

    #[tokio::test]
    async fn test_reconcile_now_queued_before_shutdown_is_answered() {
        let device = MockDevice::new("router1", drifted_state());
        let enforcement = make_loop(device.clone());
        let handle = enforcement.handle();

        // Auf dem current_thread-Runtime startet die Loop erst, wenn beide
        // Nachrichten in der Queue liegen
        let task = tokio::spawn(enforcement.run());
        let (outcome, shutdown) = tokio::join!(handle.reconcile_now(), async { handle.shutdown() });

        shutdown.unwrap();
        assert_eq!(outcome.unwrap(), IterationOutcome::Converged);

        let summary = task.await.unwrap();
        assert_eq!(summary.iterations, 1);
        assert_eq!(device.apply_calls(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_now_after_shutdown_is_dropped() {
        let device = MockDevice::new("router1", drifted_state());
        let enforcement = make_loop(device.clone());
        let handle = enforcement.handle();

        let task = tokio::spawn(enforcement.run());
        let (shutdown, outcome) = tokio::join!(async { handle.shutdown() }, handle.reconcile_now());

        shutdown.unwrap();
        assert!(matches!(outcome, Err(ReconcilerError::ChannelClosed)));

        let summary = task.await.unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(device.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_handle_fails_after_loop_stopped() {
        let device = MockDevice::new("router1", drifted_state());
        let mut options = fast_options();
        options.max_iterations = Some(1);
        let enforcement = EnforcementLoop::new(device, sample_intent(), options, MockReporter::new());
        let handle = enforcement.handle();

        enforcement.run().await;

        assert!(matches!(
            handle.reconcile_now().await,
            Err(ReconcilerError::ChannelClosed)
        ));
        assert!(matches!(handle.shutdown(), Err(ReconcilerError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_phase_after_iteration() {
        let device = MockDevice::new("router1", drifted_state());
        let mut enforcement = make_loop(device);

        enforcement.run_iteration().await;

        assert_eq!(enforcement.state().phase, LoopPhase::Idle);
        assert_eq!(enforcement.state().iteration, 1);
    }

    #[tokio::test]
    async fn test_phase_idle_after_every_outcome() {
        let device = MockDevice::new("router1", drifted_state())
            .failing_reads(1)
            .failing_applies(1);
        let mut enforcement = make_loop(device);

        assert_eq!(enforcement.run_iteration().await, IterationOutcome::StateUnknown);
        assert_eq!(enforcement.state().phase, LoopPhase::Idle);

        assert_eq!(enforcement.run_iteration().await, IterationOutcome::ApplyFailed);
        assert_eq!(enforcement.state().phase, LoopPhase::Idle);

        assert_eq!(enforcement.run_iteration().await, IterationOutcome::Converged);
        assert_eq!(enforcement.run_iteration().await, IterationOutcome::Compliant);
        assert_eq!(enforcement.state().phase, LoopPhase::Idle);
    }
}
