// src/monitor/mod.rs

//! Continuous thread tracking.
//!
//! One independent polling loop per tracking rule. Each loop re-extracts
//! the thread's filtered last-page view, diffs against the floor it saw
//! last, and fires the rule's callbacks. Loops never persist anything.

mod rule;
mod shutdown;

pub use rule::{FloorCallback, TrackingRule};
pub use shutdown::ShutdownHandle;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::FloorRecord;
use crate::services::{Extractor, Transport};

/// Per-loop tracking state. `Stopped` is the loop exiting.
enum TrackState {
    /// First poll establishes the baseline; callbacks are suppressed.
    Initializing,
    Tracking,
}

/// Runs one polling loop per rule until shutdown is requested.
pub struct Monitor {
    extractor: Arc<Extractor>,
    rules: Vec<TrackingRule>,
    shutdown: ShutdownHandle,
    grace_period: Duration,
}

impl Monitor {
    pub fn new(transport: Arc<dyn Transport>, rules: Vec<TrackingRule>) -> Result<Self> {
        Ok(Self {
            extractor: Arc::new(Extractor::new(transport)?),
            rules,
            shutdown: ShutdownHandle::new(),
            grace_period: Duration::from_millis(1000),
        })
    }

    /// How long to wait after the shutdown broadcast, letting in-flight
    /// callbacks finish.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Cancellation handle for the hosting process. The monitor itself
    /// stays free of signal handling; wire OS signals to this.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run all rule loops; resolves once every loop has stopped.
    ///
    /// A rule that exhausts its failure budget requests shutdown for the
    /// whole monitor, same path as an external request.
    pub async fn run(self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(AppError::config("no tracking rules registered"));
        }

        let mut handles = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            let extractor = Arc::clone(&self.extractor);
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(track_loop(extractor, rule, shutdown)));
        }

        for handle in handles {
            let _ = handle.await;
        }

        log::info!("monitor shutting down");
        tokio::time::sleep(self.grace_period).await;
        Ok(())
    }
}

async fn track_loop(extractor: Arc<Extractor>, rule: TrackingRule, shutdown: ShutdownHandle) {
    let mut rx = shutdown.subscribe();
    let mut state = TrackState::Initializing;
    let mut failures_left = rule.max_failures();
    let mut last_floor: Option<FloorRecord> = None;
    let url = rule.last_page_url();

    log::info!(
        "tracking bsn={} snA={} author={} every {:?}",
        rule.target().bsn,
        rule.target().sna,
        rule.author_id(),
        rule.poll_interval()
    );

    loop {
        if shutdown.is_requested() {
            break;
        }

        let current = match extractor.extract_floors_from(&url).await {
            Ok(mut floors) => floors.pop(),
            Err(e) => {
                log::error!(
                    "poll failed for bsn={} snA={}: {e}",
                    rule.target().bsn,
                    rule.target().sna
                );
                None
            }
        };

        match current {
            Some(current) => {
                if let TrackState::Tracking = state {
                    if let Some(previous) = &last_floor {
                        // Two independent observations over one snapshot:
                        // a new floor appeared, or the last floor changed.
                        if current.floor_index != previous.floor_index {
                            rule.fire_new_post(&current);
                        }
                        if current.content != previous.content {
                            rule.fire_update(&current);
                        }
                    }
                }
                last_floor = Some(current);
                state = TrackState::Tracking;
            }
            // An empty floor list counts against the budget like a failed
            // fetch; both mean the view gave us nothing to compare.
            None => {
                failures_left = failures_left.saturating_sub(1);
                log::warn!(
                    "empty or failed poll for bsn={} snA={}, {failures_left} attempts left",
                    rule.target().bsn,
                    rule.target().sna
                );
                if failures_left == 0 {
                    log::error!("failure budget exhausted, requesting monitor shutdown");
                    shutdown.request();
                    break;
                }
            }
        }

        tokio::select! {
            _ = rx.recv() => break,
            _ = tokio::time::sleep(rule.poll_interval()) => {}
        }
    }

    log::info!(
        "tracking loop stopped for bsn={} snA={}",
        rule.target().bsn,
        rule.target().sna
    );
}
