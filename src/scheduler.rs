//! Periodic fan-out over all configured watchdogs.
//!
//! Each watchdog gets its own driver task ticking at the configured period.
//! Every run is spawned as a separate Tokio task so an error or panic in one
//! instance is caught and logged here without touching the others. A run
//! that is still in flight when its next tick fires causes that tick to be
//! skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::check::{CheckOutcome, Watchdog};

/// Default period between check rounds.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(600);

/// Errors raised before scheduling begins.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// No chain is configured, so there is nothing to watch.
    #[error("no chain configured: add at least one [[chains]] entry")]
    NoChains,
    /// The period must be non-zero.
    #[error("check interval must be greater than zero")]
    ZeroInterval,
}

/// Owns every watchdog instance and drives their checks.
#[derive(Debug)]
pub struct Scheduler {
    entries: Vec<Entry>,
    period: Duration,
}

/// A watchdog together with its single-flight flag.
#[derive(Debug, Clone)]
struct Entry {
    watchdog: Arc<Watchdog>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the run that set it finishes.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    /// Create a scheduler for `watchdogs`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoChains`] when `watchdogs` is empty and
    /// [`SchedulerError::ZeroInterval`] when `period` is zero.
    pub fn new(watchdogs: Vec<Watchdog>, period: Duration) -> Result<Self, SchedulerError> {
        if watchdogs.is_empty() {
            return Err(SchedulerError::NoChains);
        }
        if period.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        let entries = watchdogs
            .into_iter()
            .map(|w| Entry {
                watchdog: Arc::new(w),
                in_flight: Arc::new(AtomicBool::new(false)),
            })
            .collect();
        Ok(Self { entries, period })
    }

    /// Labels of the watched chains, in configuration order.
    pub fn chain_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.watchdog.chain_id()).collect()
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Every instance is checked immediately, then once per period. Runs
    /// already in flight at shutdown are left to finish on their own.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            chains = ?self.chain_ids(),
            period_secs = self.period.as_secs(),
            "scheduler started"
        );

        let mut drivers = JoinSet::new();
        for entry in self.entries {
            drivers.spawn(drive(entry, self.period, shutdown.clone()));
        }
        while let Some(joined) = drivers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "watchdog driver task failed");
            }
        }
        info!("scheduler stopped");
    }

    /// Check every instance once, concurrently, and collect the results.
    ///
    /// Results are returned in configuration order.
    pub async fn run_once(&self) -> Vec<(String, anyhow::Result<CheckOutcome>)> {
        let mut runs = JoinSet::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let watchdog = Arc::clone(&entry.watchdog);
            runs.spawn(async move { (index, watchdog.run_check().await) });
        }

        let mut results: Vec<Option<anyhow::Result<CheckOutcome>>> =
            self.entries.iter().map(|_| None).collect();
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => error!(error = %e, "watchdog check task failed"),
            }
        }

        self.entries
            .iter()
            .zip(results)
            .map(|(entry, result)| {
                let result = result
                    .unwrap_or_else(|| Err(anyhow::anyhow!("check task panicked or was cancelled")));
                (entry.watchdog.chain_id().to_owned(), result)
            })
            .collect()
    }
}

/// Tick loop for one instance.
async fn drive(entry: Entry, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => trigger(&entry),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(chain = %entry.watchdog.chain_id(), "watchdog driver stopping");
                    break;
                }
            }
        }
    }
}

/// Start a run for `entry` unless one is already in flight.
fn trigger(entry: &Entry) {
    let chain = entry.watchdog.chain_id().to_owned();
    if entry.in_flight.swap(true, Ordering::AcqRel) {
        warn!(chain = %chain, "previous check still running, skipping this round");
        return;
    }

    let guard = InFlightGuard(Arc::clone(&entry.in_flight));
    let watchdog = Arc::clone(&entry.watchdog);
    tokio::spawn(async move {
        let _guard = guard;
        let run = tokio::spawn(async move { watchdog.run_check().await });
        match run.await {
            Ok(Ok(outcome)) => debug!(chain = %chain, ?outcome, "check finished"),
            Ok(Err(e)) => error!(chain = %chain, error = %format!("{e:#}"), "check error"),
            Err(e) => error!(chain = %chain, error = %e, "check task panicked"),
        }
    });
}
