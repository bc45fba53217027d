//! Cooldown-gated alert dispatch for a single watchdog instance.
//!
//! Every event is logged. Delivery through the transport happens at most
//! once per cooldown window, and the window only starts when a delivery
//! actually succeeds.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::AlertTransport;
use crate::types::AlertEvent;

/// Default minimum time between two deliveries for one instance.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(3600);

/// What happened to an event handed to [`Notifier::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The transport accepted the alert.
    Sent,
    /// The event was logged but a previous delivery is still within the cooldown.
    Suppressed,
    /// The transport only logs, so nothing reached an operator and the
    /// cooldown was not started.
    Logged,
}

/// Per-instance alert dispatcher.
pub struct Notifier {
    chain_id: String,
    transport: Arc<dyn AlertTransport>,
    cooldown: Duration,
    last_sent_at: Mutex<Option<Instant>>,
}

impl Notifier {
    /// Create a notifier for `chain_id` that has never sent anything.
    pub fn new(chain_id: &str, transport: Arc<dyn AlertTransport>, cooldown: Duration) -> Self {
        Self {
            chain_id: chain_id.to_owned(),
            transport,
            cooldown,
            last_sent_at: Mutex::new(None),
        }
    }

    /// When the last successful delivery finished, if any.
    pub fn last_sent_at(&self) -> Option<Instant> {
        *self
            .last_sent_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a delivery right now would be suppressed.
    pub fn is_in_cooldown(&self) -> bool {
        let Some(last_sent) = self.last_sent_at() else {
            return false;
        };
        Instant::now().saturating_duration_since(last_sent) < self.cooldown
    }

    /// Log `event` and deliver it unless the cooldown is active.
    ///
    /// # Errors
    ///
    /// Returns the transport error if delivery fails. The cooldown is left
    /// untouched in that case, so the next event may try again immediately.
    pub async fn notify(&self, event: &AlertEvent) -> anyhow::Result<Delivery> {
        warn!(
            chain = %event.chain_id,
            category = %event.category,
            message = %event.message,
            "alert raised"
        );

        if self.is_in_cooldown() {
            debug!(chain = %self.chain_id, "alert in cooldown, skipping delivery");
            return Ok(Delivery::Suppressed);
        }

        let subject = self.subject();
        let body = format!(
            "{message}\n\nDetected at {at}",
            message = event.message,
            at = event.raised_at.to_rfc3339(),
        );

        // The lock is not held across the send.
        self.transport.send(&subject, &body).await?;
        if !self.transport.delivers() {
            return Ok(Delivery::Logged);
        }

        *self
            .last_sent_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        info!(chain = %self.chain_id, category = %event.category, "alert delivered");
        Ok(Delivery::Sent)
    }

    /// Subject line for this instance's alerts.
    pub fn subject(&self) -> String {
        format!("{} watchdog ERROR", self.chain_id)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("chain_id", &self.chain_id)
            .field("cooldown", &self.cooldown)
            .field("last_sent_at", &self.last_sent_at())
            .finish()
    }
}
