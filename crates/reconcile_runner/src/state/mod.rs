//! State Module - Datenstrukturen für die Closed-Loop Automation
//!
//! Dieses Modul enthält die Datenstrukturen für:
//! - **Intent**: Was laut Config auf dem Gerät laufen soll
//! - **OperationalState**: Was das Gerät tatsächlich meldet
//! - **LoopState**: Zustand der Enforcement-Loop zwischen Iterationen

mod controller;
mod intent;
mod operational;

pub use controller::{LoopPhase, LoopState};
pub use intent::Intent;
pub use operational::{Device, OperationalState};
