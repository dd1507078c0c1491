//! Loop State - Minimaler Zustand der Enforcement-Loop
//!
//! Enthält nur den Zustand, der zwischen zwei Iterationen gehalten werden muss.

/// Der Zustand der Enforcement-Loop.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    /// Nummer der aktuellen Iteration (1-basiert, 0 = noch nicht gestartet)
    pub iteration: u64,
    /// Die aktuelle Phase
    pub phase: LoopPhase,
    /// Anzahl aufeinanderfolgender fehlgeschlagener Applies
    pub consecutive_failures: u32,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startet die nächste Iteration.
    pub fn begin_iteration(&mut self) {
        self.iteration += 1;
        self.phase = LoopPhase::Checking;
    }

    /// Setzt die Phase auf Applying.
    pub fn start_applying(&mut self) {
        self.phase = LoopPhase::Applying;
    }

    /// Iteration abgeschlossen, Ergebnis liegt vor.
    pub fn finish_iteration(&mut self) {
        self.phase = LoopPhase::Idle;
    }

    /// Setzt die Phase auf Waiting.
    pub fn start_waiting(&mut self) {
        self.phase = LoopPhase::Waiting;
    }

    /// Setzt die Phase auf Stopped.
    pub fn stop(&mut self) {
        self.phase = LoopPhase::Stopped;
    }

    /// Ein Apply war erfolgreich, der Fehlerzähler wird zurückgesetzt.
    pub fn record_apply_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Ein Apply ist fehlgeschlagen.
    pub fn record_apply_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }
}

/// Die Phase innerhalb einer Iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPhase {
    /// Noch keine Iteration gelaufen
    #[default]
    NotStarted,
    /// Zustand wird gelesen und verglichen
    Checking,
    /// Intent wird auf das Gerät geschrieben
    Applying,
    /// Iteration beendet, noch nicht in der Wartephase
    Idle,
    /// Warten auf die nächste Iteration
    Waiting,
    /// Loop wurde beendet
    Stopped,
}
