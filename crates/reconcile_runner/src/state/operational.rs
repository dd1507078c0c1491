//! Operational State - Was das Gerät tatsächlich meldet
//!
//! Der OperationalState wird über das DeviceBackend abgefragt und
//! repräsentiert den Ist-Zustand des Geräts.

use netloop_intent_config::IntentConfig;

use super::Intent;
use crate::ReconcilerError;

/// Der beobachtete Zustand eines Geräts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationalState {
    /// Aktuell laufender Service
    pub service: String,
    /// Aktuell konfigurierter Port
    pub port: u16,
    /// Aktuelle TLS-Einstellung
    pub tls_enabled: bool,
}

impl OperationalState {
    pub fn new(service: impl Into<String>, port: u16, tls_enabled: bool) -> Self {
        Self {
            service: service.into(),
            port,
            tls_enabled,
        }
    }

    /// Erstellt einen Zustand aus der Config (z.B. Startzustand der Simulation).
    pub fn from_config(config: &IntentConfig) -> Result<Self, ReconcilerError> {
        let port = u16::try_from(config.port).map_err(|_| {
            ReconcilerError::InvalidIntent(format!(
                "port must be between 1 and 65535, got {}",
                config.port
            ))
        })?;

        Ok(Self::new(config.service.clone(), port, config.tls))
    }
}

impl From<&Intent> for OperationalState {
    /// Der Zustand, den ein Gerät nach erfolgreichem Apply hat.
    fn from(intent: &Intent) -> Self {
        Self {
            service: intent.service().to_string(),
            port: intent.port(),
            tls_enabled: intent.tls_enabled(),
        }
    }
}

/// Ein verwaltetes Gerät mit seinem aktuellen Zustand.
///
/// Gehört exklusiv einem Backend; nur `apply_intent` schreibt `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Hostname bzw. Gerätename
    pub name: String,
    /// Aktueller Zustand
    pub state: OperationalState,
}

impl Device {
    pub fn new(name: impl Into<String>, state: OperationalState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}
