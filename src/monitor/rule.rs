// src/monitor/rule.rs

//! Declarative polling target: thread + author filter + cadence + budget.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{FORUM_BASE_URL, FloorRecord, TargetInfo};

/// Callback invoked with the floor that triggered the observation.
pub type FloorCallback = Arc<dyn Fn(&FloorRecord) + Send + Sync>;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FAILURES: u32 = 20;

/// One thread/author to poll continuously.
pub struct TrackingRule {
    target: TargetInfo,
    author_id: String,
    poll_interval: Duration,
    max_failures: u32,
    new_post_callback: FloorCallback,
    update_callback: FloorCallback,
}

impl TrackingRule {
    /// Both ids must be positive and the author filter non-empty.
    /// Callbacks default to log statements.
    pub fn new(bsn: u64, sna: u64, author_id: impl Into<String>) -> Result<Self> {
        let target = TargetInfo::new(bsn, sna);
        target.validate()?;

        let author_id = author_id.into();
        if author_id.trim().is_empty() {
            return Err(AppError::invalid_target("author id is empty"));
        }

        Ok(Self {
            target,
            author_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_failures: DEFAULT_MAX_FAILURES,
            new_post_callback: Arc::new(|floor: &FloorRecord| {
                log::info!("new post on floor {}: {}", floor.floor_index, floor.content);
            }),
            update_callback: Arc::new(|floor: &FloorRecord| {
                log::info!("floor {} updated: {}", floor.floor_index, floor.content);
            }),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn on_new_post(mut self, callback: impl Fn(&FloorRecord) + Send + Sync + 'static) -> Self {
        self.new_post_callback = Arc::new(callback);
        self
    }

    pub fn on_update(mut self, callback: impl Fn(&FloorRecord) + Send + Sync + 'static) -> Self {
        self.update_callback = Arc::new(callback);
        self
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// The filtered last-page view this rule polls.
    pub fn last_page_url(&self) -> String {
        format!(
            "{}bsn={}&snA={}&s_author={}&last=1#down",
            FORUM_BASE_URL, self.target.bsn, self.target.sna, self.author_id
        )
    }

    pub(crate) fn fire_new_post(&self, floor: &FloorRecord) {
        (self.new_post_callback)(floor);
    }

    pub(crate) fn fire_update(&self, floor: &FloorRecord) {
        (self.update_callback)(floor);
    }
}
