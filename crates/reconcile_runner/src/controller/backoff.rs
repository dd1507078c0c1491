//! Backoff - Wartezeit nach fehlgeschlagenen Applies
//!
//! Ein Gerät, das Pushes dauerhaft ablehnt, soll nicht in jedem Intervall
//! erneut beschrieben werden. Die Wartezeit verdoppelt sich pro Fehlschlag
//! und ist nach oben begrenzt.

use std::time::Duration;

/// Begrenzter exponentieller Backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximale Wartezeit zwischen zwei Iterationen
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    /// Berechnet die Wartezeit vor der nächsten Iteration.
    ///
    /// Ohne Fehlschlag und nach dem ersten Fehlschlag wird das normale
    /// Intervall verwendet, danach `interval * 2^(failures - 1)`.
    pub fn delay(&self, interval: Duration, consecutive_failures: u32) -> Duration {
        if consecutive_failures <= 1 {
            return interval;
        }

        2u32.checked_pow(consecutive_failures - 1)
            .and_then(|factor| interval.checked_mul(factor))
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
            .max(interval)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
