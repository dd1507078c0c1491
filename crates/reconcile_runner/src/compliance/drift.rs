//! Drift - Abweichungen zwischen Intent und Ist-Zustand
//!
//! Drift wird nie gespeichert, sondern bei jeder Iteration neu berechnet.
//! Die Feld-Liste dient nur der Diagnose; angewendet wird immer der
//! komplette Intent.

use std::fmt;

/// Ein vergleichbares Feld des Zustands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Service,
    Port,
    Tls,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Port => "port",
            Self::Tls => "tls",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ein einzelnes abweichendes Feld mit Ist- und Soll-Wert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDrift {
    /// Das betroffene Feld
    pub field: FieldName,
    /// Wert auf dem Gerät (vorher)
    pub observed: String,
    /// Wert laut Intent (nachher)
    pub desired: String,
}

impl FieldDrift {
    pub fn new(field: FieldName, observed: impl ToString, desired: impl ToString) -> Self {
        Self {
            field,
            observed: observed.to_string(),
            desired: desired.to_string(),
        }
    }
}

impl fmt::Display for FieldDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.observed, self.desired)
    }
}
