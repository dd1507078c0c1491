//! Compliance Module - Pure Functions für den Soll/Ist-Vergleich
//!
//! Beide Funktionen sind **pure functions**:
//! - Keine Side Effects
//! - Deterministisch
//! - Beliebig oft aufrufbar, ohne den Zustand zu verändern
//!
//! Die Loop kann deshalb so oft pollen wie sie will.

mod drift;

pub use drift::{FieldDrift, FieldName};

use crate::state::{Intent, OperationalState};

/// Prüft ob der Ist-Zustand exakt dem Intent entspricht.
///
/// Jedes einzelne abweichende Feld macht das Gerät non-compliant,
/// es gibt keine Teil-Compliance.
pub fn is_compliant(intent: &Intent, state: &OperationalState) -> bool {
    intent.service() == state.service
        && intent.port() == state.port
        && intent.tls_enabled() == state.tls_enabled
}

/// Listet alle abweichenden Felder auf (Reihenfolge: service, port, tls).
///
/// Leer genau dann, wenn [`is_compliant`] true liefert.
pub fn detect_drift(intent: &Intent, state: &OperationalState) -> Vec<FieldDrift> {
    let mut drift = Vec::new();

    if intent.service() != state.service {
        drift.push(FieldDrift::new(FieldName::Service, &state.service, intent.service()));
    }
    if intent.port() != state.port {
        drift.push(FieldDrift::new(FieldName::Port, state.port, intent.port()));
    }
    if intent.tls_enabled() != state.tls_enabled {
        drift.push(FieldDrift::new(FieldName::Tls, state.tls_enabled, intent.tls_enabled()));
    }

    drift
}
