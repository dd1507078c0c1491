//! Handle - Steuerung der Enforcement-Loop per Message Passing
//!
//! Nur die Loop besitzt das Gerät. Andere Tasks dürfen eine Iteration
//! anstoßen oder die Loop beenden, bekommen aber nie Zugriff auf den Zustand.

use tokio::sync::{mpsc, oneshot};

use crate::controller::IterationOutcome;
use crate::ReconcilerError;

/// Nachrichten an die Enforcement-Loop
#[derive(Debug)]
pub enum ControlMessage {
    /// Sofort eine Iteration ausführen und das Ergebnis zurückschicken
    ReconcileNow {
        result_tx: oneshot::Sender<IterationOutcome>,
    },
    /// Loop nach der aktuellen Iteration beenden
    Shutdown,
}

/// Handle zum Steuern einer laufenden Enforcement-Loop
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ReconcilerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControlMessage>) -> Self {
        Self { tx }
    }

    /// Stößt eine Iteration außerhalb des Intervalls an und wartet auf das Ergebnis.
    pub async fn reconcile_now(&self) -> Result<IterationOutcome, ReconcilerError> {
        let (result_tx, result_rx) = oneshot::channel();

        self.tx
            .send(ControlMessage::ReconcileNow { result_tx })
            .map_err(|_| ReconcilerError::ChannelClosed)?;

        result_rx.await.map_err(|_| ReconcilerError::ChannelClosed)
    }

    /// Beendet die Loop zwischen zwei Iterationen.
    pub fn shutdown(&self) -> Result<(), ReconcilerError> {
        self.tx
            .send(ControlMessage::Shutdown)
            .map_err(|_| ReconcilerError::ChannelClosed)
    }
}
