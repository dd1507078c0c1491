//! Intent - Was laut Config auf dem Gerät laufen soll
//!
//! Der Intent wird einmalig aus der Konfiguration erzeugt und repräsentiert
//! den Soll-Zustand des Geräts. Er ist für die gesamte Laufzeit unveränderlich.

use netloop_intent_config::IntentConfig;

use crate::ReconcilerError;

/// Der gewünschte Zustand des Geräts.
///
/// Die Felder sind privat, damit der Intent nach dem Laden nicht mehr
/// verändert werden kann.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    service: String,
    port: u16,
    tls_enabled: bool,
}

impl Intent {
    /// Erstellt einen validierten Intent.
    pub fn new(
        service: impl Into<String>,
        port: u16,
        tls_enabled: bool,
    ) -> Result<Self, ReconcilerError> {
        let service = service.into();

        if service.trim().is_empty() {
            return Err(ReconcilerError::InvalidIntent(
                "service must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(ReconcilerError::InvalidIntent(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(Self {
            service,
            port,
            tls_enabled,
        })
    }

    /// Erstellt einen Intent aus dem `intent`-Abschnitt der Config.
    pub fn from_config(config: &IntentConfig) -> Result<Self, ReconcilerError> {
        let port = u16::try_from(config.port).map_err(|_| {
            ReconcilerError::InvalidIntent(format!(
                "port must be between 1 and 65535, got {}",
                config.port
            ))
        })?;

        Self::new(config.service.clone(), port, config.tls)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_enabled
    }
}
