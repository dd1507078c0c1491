use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;

use netloop_intent_config::{Config, ControllerConfig};

pub mod compliance;
pub mod controller;
pub mod state;

pub use compliance::{detect_drift, is_compliant, FieldDrift, FieldName};
pub use controller::{
    BackoffPolicy, EnforcementLoop, IterationOutcome, LoopSummary, ReconcilerHandle,
};
pub use state::{Device, Intent, LoopPhase, LoopState, OperationalState};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Failed to read operational state: {0}")]
    StateRead(String),

    #[error("Failed to apply intent: {0}")]
    Apply(String),

    #[error("Applying intent timed out after {0:?}")]
    ApplyTimeout(Duration),

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Reconciler terminated")]
    ChannelClosed,
}

// ============================================================================
// LoopOptions - Timing der Enforcement-Loop
// ============================================================================

/// Optionen für die Enforcement-Loop
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Wartezeit zwischen zwei Iterationen
    pub interval: Duration,
    /// Maximale Dauer eines einzelnen Applies
    pub apply_timeout: Duration,
    /// Backoff nach fehlgeschlagenen Applies (None = immer `interval`)
    pub backoff: Option<BackoffPolicy>,
    /// Loop nach N Iterationen beenden (None = endlos)
    pub max_iterations: Option<u64>,
}

impl LoopOptions {
    /// Erstellt die Optionen aus dem `controller`-Abschnitt der Config.
    pub fn from_config(config: &ControllerConfig) -> Self {
        let backoff = config
            .backoff
            .enabled
            .then(|| BackoffPolicy::new(Duration::from_secs(config.backoff.max_secs)));

        Self {
            interval: Duration::from_secs(config.interval_secs),
            apply_timeout: Duration::from_secs(config.apply_timeout_secs),
            backoff,
            max_iterations: None,
        }
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

// ============================================================================
// DeviceBackend Trait - abstrahiert den Gerätezugriff
// ============================================================================

/// Trait für den Zugriff auf ein verwaltetes Gerät.
/// Ermöglicht echte Collector-Implementierungen (gNMI, NETCONF) und Mocks.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Name des Geräts (für Logs)
    fn name(&self) -> &str;

    /// Liest den aktuellen Zustand. Darf das Gerät nicht verändern.
    async fn read_state(&self) -> Result<OperationalState, ReconcilerError>;

    /// Schreibt den kompletten Intent auf das Gerät.
    ///
    /// Bei Erfolg entspricht der zurückgegebene Zustand exakt dem Intent.
    /// Bei einem Fehler bleibt der Zustand unverändert.
    async fn apply_intent(&mut self, intent: &Intent) -> Result<OperationalState, ReconcilerError>;
}

// ============================================================================
// SimulatedDevice - In-Memory Gerät statt echtem Collector
// ============================================================================

/// Simuliertes Gerät, dessen Zustand nur im Speicher existiert
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    device: Device,
    platform: String,
    rejects_remaining: u32,
}

impl SimulatedDevice {
    pub fn new(device: Device, platform: impl Into<String>) -> Self {
        Self {
            device,
            platform: platform.into(),
            rejects_remaining: 0,
        }
    }

    /// Erstellt das Gerät aus `device`- und `simulation`-Abschnitt der Config.
    pub fn from_config(config: &Config) -> Result<Self, ReconcilerError> {
        let state = OperationalState::from_config(&config.simulation.initial_state)?;
        let device = Device::new(config.device.hostname.clone(), state);

        Ok(Self::new(device, config.device.platform.clone())
            .reject_first_applies(config.simulation.reject_first_applies))
    }

    /// Lehnt die ersten N Pushes ab
    pub fn reject_first_applies(mut self, count: u32) -> Self {
        self.rejects_remaining = count;
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }
}

#[async_trait]
impl DeviceBackend for SimulatedDevice {
    fn name(&self) -> &str {
        &self.device.name
    }

    async fn read_state(&self) -> Result<OperationalState, ReconcilerError> {
        Ok(self.device.state.clone())
    }

    async fn apply_intent(&mut self, intent: &Intent) -> Result<OperationalState, ReconcilerError> {
        if self.rejects_remaining > 0 {
            self.rejects_remaining -= 1;
            return Err(ReconcilerError::Apply(format!(
                "{} ({}) rejected the configuration",
                self.device.name, self.platform
            )));
        }

        // Zustand erst nach bestätigtem Push überschreiben
        self.device.state = OperationalState::from(intent);
        Ok(self.device.state.clone())
    }
}

// ============================================================================
// LoopReporter Trait - abstrahiert die Ausgabe der Loop
// ============================================================================

/// Trait für Ereignisse während der Enforcement-Loop.
/// Ermöglicht strukturierte Logs im Betrieb und aufzeichnende Mocks in Tests.
pub trait LoopReporter: Send {
    /// Wird einmal vor der ersten Iteration aufgerufen
    fn on_start(&mut self, device: &str, intent: &Intent);

    /// Wird zu Beginn jeder Iteration aufgerufen
    fn on_iteration(&mut self, iteration: u64);

    /// Gerät ist compliant, keine Aktion
    fn on_compliant(&mut self, iteration: u64, state: &OperationalState);

    /// Drift erkannt (vor dem Apply)
    fn on_drift(&mut self, iteration: u64, drift: &[FieldDrift]);

    /// Intent wurde erfolgreich angewendet
    fn on_applied(&mut self, iteration: u64, state: &OperationalState);

    /// Apply ist fehlgeschlagen, Zustand unverändert
    fn on_apply_failed(&mut self, iteration: u64, error: &ReconcilerError, consecutive_failures: u32);

    /// Zustand konnte nicht gelesen werden
    fn on_state_read_failed(&mut self, iteration: u64, error: &ReconcilerError);

    /// Loop wartet auf die nächste Iteration
    fn on_waiting(&mut self, delay: Duration);

    /// Loop wurde beendet
    fn on_stopped(&mut self, summary: &LoopSummary);
}

// ============================================================================
// TracingReporter - Strukturierte Events über tracing
// ============================================================================

/// Reporter, der jedes Ereignis als tracing-Event ausgibt
#[derive(Debug, Default)]
pub struct TracingReporter {
    device: String,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoopReporter for TracingReporter {
    fn on_start(&mut self, device: &str, intent: &Intent) {
        self.device = device.to_string();
        tracing::info!(
            device = %self.device,
            service = intent.service(),
            port = intent.port(),
            tls = intent.tls_enabled(),
            "starting closed-loop enforcement"
        );
    }

    fn on_iteration(&mut self, iteration: u64) {
        tracing::debug!(device = %self.device, iteration, "retrieving operational state");
    }

    fn on_compliant(&mut self, iteration: u64, state: &OperationalState) {
        tracing::info!(
            device = %self.device,
            iteration,
            service = %state.service,
            port = state.port,
            tls = state.tls_enabled,
            "compliant, no action needed"
        );
    }

    fn on_drift(&mut self, iteration: u64, drift: &[FieldDrift]) {
        tracing::warn!(
            device = %self.device,
            iteration,
            fields = drift.len(),
            "drift detected, applying intent"
        );
        for field in drift {
            tracing::info!(
                device = %self.device,
                iteration,
                field = field.field.as_str(),
                observed = %field.observed,
                desired = %field.desired,
                "field drift"
            );
        }
    }

    fn on_applied(&mut self, iteration: u64, state: &OperationalState) {
        tracing::info!(
            device = %self.device,
            iteration,
            service = %state.service,
            port = state.port,
            tls = state.tls_enabled,
            "configuration applied"
        );
    }

    fn on_apply_failed(&mut self, iteration: u64, error: &ReconcilerError, consecutive_failures: u32) {
        tracing::error!(
            device = %self.device,
            iteration,
            consecutive_failures,
            error = %error,
            "apply failed, device state unchanged"
        );
    }

    fn on_state_read_failed(&mut self, iteration: u64, error: &ReconcilerError) {
        tracing::warn!(
            device = %self.device,
            iteration,
            error = %error,
            "operational state unknown, skipping apply"
        );
    }

    fn on_waiting(&mut self, delay: Duration) {
        tracing::debug!(
            device = %self.device,
            delay_ms = delay.as_millis() as u64,
            "waiting for next iteration"
        );
    }

    fn on_stopped(&mut self, summary: &LoopSummary) {
        tracing::info!(
            device = %self.device,
            iterations = summary.iterations,
            applies = summary.applies,
            apply_failures = summary.apply_failures,
            read_failures = summary.read_failures,
            "enforcement loop stopped"
        );
    }
}

// ============================================================================
// Test Utilities
// ============================================================================

pub mod test_utils {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Intent aus dem Standard-Szenario (gnmi, 57400, TLS)
    pub fn sample_intent() -> Intent {
        Intent::new("gnmi", 57400, true).expect("valid intent")
    }

    /// Startzustand aus dem Standard-Szenario (grpc, 57777, kein TLS)
    pub fn drifted_state() -> OperationalState {
        OperationalState::new("grpc", 57777, false)
    }

    /// Mock Reporter für Tests - zeichnet alle Events auf
    ///
    /// Clones teilen sich die Event-Liste.
    #[derive(Debug, Clone, Default)]
    pub struct MockReporter {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl MockReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl LoopReporter for MockReporter {
        fn on_start(&mut self, device: &str, _intent: &Intent) {
            self.push(format!("start:{}", device));
        }
        fn on_iteration(&mut self, iteration: u64) {
            self.push(format!("iteration:{}", iteration));
        }
        fn on_compliant(&mut self, iteration: u64, _state: &OperationalState) {
            self.push(format!("compliant:{}", iteration));
        }
        fn on_drift(&mut self, iteration: u64, drift: &[FieldDrift]) {
            for field in drift {
                self.push(format!("drift:{}:{}", iteration, field));
            }
        }
        fn on_applied(&mut self, iteration: u64, _state: &OperationalState) {
            self.push(format!("applied:{}", iteration));
        }
        fn on_apply_failed(&mut self, iteration: u64, _error: &ReconcilerError, consecutive_failures: u32) {
            self.push(format!("apply_failed:{}:{}", iteration, consecutive_failures));
        }
        fn on_state_read_failed(&mut self, iteration: u64, _error: &ReconcilerError) {
            self.push(format!("read_failed:{}", iteration));
        }
        fn on_waiting(&mut self, delay: Duration) {
            self.push(format!("waiting:{}", delay.as_millis()));
        }
        fn on_stopped(&mut self, summary: &LoopSummary) {
            self.push(format!("stopped:{}", summary.iterations));
        }
    }

    #[derive(Debug)]
    struct MockDeviceInner {
        state: OperationalState,
        read_calls: usize,
        apply_calls: usize,
        failing_reads: usize,
        failing_applies: usize,
        apply_delay: Option<Duration>,
    }

    /// Mock Gerät für Tests - zählt alle Aufrufe
    ///
    /// Clones teilen sich Zustand und Zähler, damit Tests nach dem Verschieben
    /// in die Loop weiter prüfen können.
    #[derive(Debug, Clone)]
    pub struct MockDevice {
        name: String,
        inner: Arc<Mutex<MockDeviceInner>>,
    }

    impl MockDevice {
        pub fn new(name: &str, state: OperationalState) -> Self {
            Self {
                name: name.to_string(),
                inner: Arc::new(Mutex::new(MockDeviceInner {
                    state,
                    read_calls: 0,
                    apply_calls: 0,
                    failing_reads: 0,
                    failing_applies: 0,
                    apply_delay: None,
                })),
            }
        }

        /// Die nächsten N Reads schlagen fehl
        pub fn failing_reads(self, count: usize) -> Self {
            self.inner.lock().unwrap().failing_reads = count;
            self
        }

        /// Die nächsten N Applies schlagen fehl
        pub fn failing_applies(self, count: usize) -> Self {
            self.inner.lock().unwrap().failing_applies = count;
            self
        }

        /// Jeder Apply braucht so lange, bevor er schreibt
        pub fn with_apply_delay(self, delay: Duration) -> Self {
            self.inner.lock().unwrap().apply_delay = Some(delay);
            self
        }

        pub fn state(&self) -> OperationalState {
            self.inner.lock().unwrap().state.clone()
        }

        /// Simuliert eine Änderung am Gerät außerhalb der Loop
        pub fn set_state(&self, state: OperationalState) {
            self.inner.lock().unwrap().state = state;
        }

        pub fn read_calls(&self) -> usize {
            self.inner.lock().unwrap().read_calls
        }

        pub fn apply_calls(&self) -> usize {
            self.inner.lock().unwrap().apply_calls
        }
    }

    #[async_trait]
    impl DeviceBackend for MockDevice {
        fn name(&self) -> &str {
            &self.name
        }

        async fn read_state(&self) -> Result<OperationalState, ReconcilerError> {
            let mut inner = self.inner.lock().unwrap();
            inner.read_calls += 1;

            if inner.failing_reads > 0 {
                inner.failing_reads -= 1;
                return Err(ReconcilerError::StateRead("mock read failure".to_string()));
            }

            Ok(inner.state.clone())
        }

        async fn apply_intent(&mut self, intent: &Intent) -> Result<OperationalState, ReconcilerError> {
            let delay = {
                let mut inner = self.inner.lock().unwrap();
                inner.apply_calls += 1;

                if inner.failing_applies > 0 {
                    inner.failing_applies -= 1;
                    return Err(ReconcilerError::Apply("mock apply failure".to_string()));
                }

                inner.apply_delay
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut inner = self.inner.lock().unwrap();
            inner.state = OperationalState::from(intent);
            Ok(inner.state.clone())
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
