//! Reconciliation of one relay against the reference chain.
//!
//! A round reads the relay tip and the bitcoind tip height, compares them,
//! then verifies the relay tip hash is on bitcoind's main chain. Transient
//! source failures are retried a bounded number of times with a fixed delay;
//! every other failure is alerted immediately and ends the round.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, instrument, warn};

use crate::notifier::{Delivery, Notifier};
use crate::source::{ReferenceChain, RelayTipSource, SourceError};
use crate::types::{AlertCategory, AlertEvent};

/// Tuning knobs for a reconciliation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPolicy {
    /// Largest tolerated `|reference - relay|` height difference.
    pub max_height_difference: u64,
    /// Attempts per round before giving up on transient failures.
    pub retry_count: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Raise an [`AlertCategory::Inconclusive`] alert when every attempt failed transiently.
    pub alert_on_inconclusive: bool,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            max_height_difference: 3,
            retry_count: 3,
            retry_delay: Duration::from_secs(10),
            alert_on_inconclusive: true,
        }
    }
}

/// Result of one reconciliation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Heights agree and the relay tip is on the main chain.
    Healthy,
    /// A reconciliation failure was found and handed to the notifier.
    Alerted {
        /// Failure classification.
        category: AlertCategory,
        /// Whether the alert was delivered or suppressed by the cooldown.
        delivery: Delivery,
    },
    /// Every attempt failed transiently.
    Inconclusive {
        /// Attempts made.
        attempts: u32,
    },
}

impl CheckOutcome {
    /// True only for [`CheckOutcome::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Outcome of a single attempt that did not hit a source error.
enum Verdict {
    Healthy,
    Alert(AlertEvent),
}

/// Watches one relay deployment.
pub struct Watchdog {
    chain_id: String,
    relay: Arc<dyn RelayTipSource>,
    reference: Arc<dyn ReferenceChain>,
    notifier: Notifier,
    policy: CheckPolicy,
}

impl Watchdog {
    /// Create a watchdog for `chain_id`.
    pub fn new(
        chain_id: &str,
        relay: Arc<dyn RelayTipSource>,
        reference: Arc<dyn ReferenceChain>,
        notifier: Notifier,
        policy: CheckPolicy,
    ) -> Self {
        Self {
            chain_id: chain_id.to_owned(),
            relay,
            reference,
            notifier,
            policy,
        }
    }

    /// Label of the monitored chain.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// This instance's notifier.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Active policy.
    pub fn policy(&self) -> &CheckPolicy {
        &self.policy
    }

    /// Run one reconciliation round.
    ///
    /// # Errors
    ///
    /// Returns an error only when delivering an alert fails. Source failures
    /// are reported through alerts, never through this result.
    #[instrument(skip_all, fields(chain = %self.chain_id, check_id = %uuid::Uuid::new_v4()))]
    pub async fn run_check(&self) -> anyhow::Result<CheckOutcome> {
        let attempts = self.policy.retry_count.max(1);
        let mut last_error: Option<SourceError> = None;

        for attempt in 1..=attempts {
            match self.attempt().await {
                Ok(Verdict::Healthy) => return Ok(CheckOutcome::Healthy),
                Ok(Verdict::Alert(event)) => return self.raise(event).await,
                Err(e) if e.is_transient() => {
                    warn!(attempt, attempts, error = %e, "transient failure during check");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "check failed");
                    let event = AlertEvent::generic(&self.chain_id, &e.to_string());
                    return self.raise(event).await;
                }
            }
        }

        warn!(attempts, "retries exhausted, check inconclusive");
        if self.policy.alert_on_inconclusive {
            let last = last_error
                .as_ref()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);
            let event = AlertEvent::inconclusive(&self.chain_id, attempts, &last);
            self.notifier
                .notify(&event)
                .await
                .with_context(|| format!("failed to deliver {} alert", event.category))?;
        }
        Ok(CheckOutcome::Inconclusive { attempts })
    }

    /// One pass over the reconciliation steps.
    async fn attempt(&self) -> Result<Verdict, SourceError> {
        let relay_tip = self.relay.tip().await?;
        let reference_height = self.reference.tip_height().await?;

        info!(
            relay_height = relay_tip.height,
            bitcoin_height = reference_height,
            "running check"
        );

        if relay_tip.height.abs_diff(reference_height) > self.policy.max_height_difference {
            return Ok(Verdict::Alert(AlertEvent::divergence(
                &self.chain_id,
                relay_tip.height,
                reference_height,
            )));
        }

        match self.reference.is_in_main_chain(&relay_tip.hash).await {
            Ok(true) => {
                info!(hash = %relay_tip.hash, "tip is in main chain");
                Ok(Verdict::Healthy)
            }
            Ok(false) => {
                warn!(hash = %relay_tip.hash, "tip is not in main chain");
                Ok(Verdict::Alert(AlertEvent::reorg_suspected(
                    &self.chain_id,
                    &relay_tip.hash,
                )))
            }
            // A timed-out or refused lookup says nothing about the tip, so it
            // goes back to the retry loop instead of raising LookupError.
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                error!(hash = %relay_tip.hash, error = %e, "main chain lookup failed");
                Ok(Verdict::Alert(AlertEvent::lookup_error(
                    &self.chain_id,
                    &relay_tip.hash,
                    &e.to_string(),
                )))
            }
        }
    }

    async fn raise(&self, event: AlertEvent) -> anyhow::Result<CheckOutcome> {
        let delivery = self
            .notifier
            .notify(&event)
            .await
            .with_context(|| format!("failed to deliver {} alert", event.category))?;
        Ok(CheckOutcome::Alerted {
            category: event.category,
            delivery,
        })
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("chain_id", &self.chain_id)
            .field("notifier", &self.notifier)
            .field("policy", &self.policy)
            .finish()
    }
}
