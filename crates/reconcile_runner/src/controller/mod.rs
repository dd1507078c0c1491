//! Controller Module - Closed-Loop Controller
//!
//! Dieses Modul enthält die EnforcementLoop:
//! 1. Hole aktuellen Zustand (OperationalState)
//! 2. Prüfe Compliance
//! 3. Wende bei Drift den Intent an
//! 4. Warte und wiederhole, bis Shutdown kommt

pub mod backoff;
pub mod enforcement;
pub mod handle;

pub use backoff::BackoffPolicy;
pub use enforcement::{EnforcementLoop, IterationOutcome, LoopSummary};
pub use handle::{ControlMessage, ReconcilerHandle};
