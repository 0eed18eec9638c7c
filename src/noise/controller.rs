//! Throttled error reporting with auto-recovery hooks.
//!
//! # Throttle
//! Occurrences of one message inside the sliding window are handled as:
//! ```text
//! 1st                → Logged      (warn/error, counts as visible)
//! 2nd ..= threshold  → Demoted     (debug only)
//! > threshold        → Suppressed  (counted, not logged)
//! ```
//! Messages classified as known noise are never Logged; their first
//! occurrence is Demoted.
//!
//! Throttling only affects logging. Recovery actions and the counters see
//! every report.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::NoiseConfig;
use crate::connection::state::now_millis;
use crate::noise::classify::{classify, Classification, ErrorCategory, Severity};
use crate::observability::metrics;

/// Windows kept before idle ones are pruned.
const MAX_TRACKED_MESSAGES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    #[serde(rename = "type")]
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Milliseconds since epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Logged,
    Demoted,
    Suppressed,
}

impl ReportOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ReportOutcome::Logged => "logged",
            ReportOutcome::Demoted => "demoted",
            ReportOutcome::Suppressed => "suppressed",
        }
    }
}

/// Snapshot returned by `get_error_stats`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: u64,
    /// Reports that produced a warn/error line.
    pub visible: u64,
    pub suppressed: u64,
    /// Every report per distinct message, throttled or not.
    pub by_message: BTreeMap<String, u64>,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    /// Recovery actions run, per key.
    pub recoveries: BTreeMap<String, u64>,
    /// Most recent records, oldest first.
    pub recent: Vec<ErrorRecord>,
}

/// Which reports fire a recovery action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryTrigger {
    Category(ErrorCategory),
    /// Case-insensitive substring.
    Contains(String),
}

impl RecoveryTrigger {
    fn matches(&self, lowered: &str, class: &Classification) -> bool {
        match self {
            RecoveryTrigger::Category(category) => class.category == *category,
            RecoveryTrigger::Contains(needle) => lowered.contains(&needle.to_lowercase()),
        }
    }
}

pub type RecoveryAction = Arc<dyn Fn() + Send + Sync>;

/// Hook through which other components feed failures into `report`.
pub type ErrorReporter = Box<dyn Fn(&str) + Send + Sync>;

struct Recovery {
    key: String,
    trigger: RecoveryTrigger,
    action: RecoveryAction,
    last_run: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    windows: HashMap<String, VecDeque<Instant>>,
    ring: VecDeque<ErrorRecord>,
    by_message: BTreeMap<String, u64>,
    by_category: BTreeMap<ErrorCategory, u64>,
    total: u64,
    visible: u64,
    suppressed: u64,
    recoveries: Vec<Recovery>,
    recovery_runs: BTreeMap<String, u64>,
}

/// Owns the diagnostic ring buffer and throttle state. Callers only ever
/// receive snapshots.
pub struct NoiseController {
    config: NoiseConfig,
    inner: Mutex<Inner>,
}

impl NoiseController {
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register (or replace) the recovery action for `key`. The action runs
    /// at most once per recovery delay, however often its trigger fires.
    pub fn register_recovery<F>(&self, key: impl Into<String>, trigger: RecoveryTrigger, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key = key.into();
        let mut inner = self.lock();
        inner.recoveries.retain(|r| r.key != key);
        inner.recoveries.push(Recovery {
            key,
            trigger,
            action: Arc::new(action),
            last_run: None,
        });
    }

    /// Record one occurrence of `message`.
    pub fn report(&self, message: &str) -> ReportOutcome {
        let message = message.trim();
        let now = Instant::now();
        let window = Duration::from_millis(self.config.throttle_window_ms);
        let recovery_delay = Duration::from_millis(self.config.recovery_delay_ms);
        let class = classify(message);
        let lowered = message.to_lowercase();

        let (outcome, due) = {
            let mut inner = self.lock();

            if inner.windows.len() >= MAX_TRACKED_MESSAGES && !inner.windows.contains_key(message) {
                inner
                    .windows
                    .retain(|_, hits| hits.back().is_some_and(|last| now.duration_since(*last) < window));
            }
            let hits = inner.windows.entry(message.to_string()).or_default();
            while hits.front().is_some_and(|first| now.duration_since(*first) >= window) {
                hits.pop_front();
            }
            hits.push_back(now);
            let seen = hits.len() as u64;

            let outcome = if seen > u64::from(self.config.throttle_threshold) {
                ReportOutcome::Suppressed
            } else if seen == 1 && !class.noisy {
                ReportOutcome::Logged
            } else {
                ReportOutcome::Demoted
            };

            inner.total += 1;
            match outcome {
                ReportOutcome::Logged => inner.visible += 1,
                ReportOutcome::Suppressed => inner.suppressed += 1,
                ReportOutcome::Demoted => {}
            }
            *inner.by_message.entry(message.to_string()).or_insert(0) += 1;
            *inner.by_category.entry(class.category).or_insert(0) += 1;

            if inner.ring.len() >= self.config.ring_capacity.max(1) {
                inner.ring.pop_front();
            }
            inner.ring.push_back(ErrorRecord {
                message: message.to_string(),
                category: class.category,
                severity: class.severity,
                timestamp: now_millis(),
            });

            let mut due: Vec<(String, RecoveryAction)> = Vec::new();
            for recovery in inner.recoveries.iter_mut() {
                if !recovery.trigger.matches(&lowered, &class) {
                    continue;
                }
                if recovery.last_run.is_some_and(|last| now.duration_since(last) < recovery_delay) {
                    continue;
                }
                recovery.last_run = Some(now);
                due.push((recovery.key.clone(), Arc::clone(&recovery.action)));
            }
            for (key, _) in &due {
                *inner.recovery_runs.entry(key.clone()).or_insert(0) += 1;
            }

            (outcome, due)
        };

        metrics::record_error_report(outcome.as_str());
        match outcome {
            ReportOutcome::Logged if class.severity == Severity::High => {
                tracing::error!(category = class.category.as_str(), message = %message, "Error reported");
            }
            ReportOutcome::Logged => {
                tracing::warn!(category = class.category.as_str(), message = %message, "Error reported");
            }
            ReportOutcome::Demoted => {
                tracing::debug!(category = class.category.as_str(), message = %message, "Repeated error");
            }
            ReportOutcome::Suppressed => {}
        }

        for (key, action) in due {
            metrics::record_recovery_attempt(&key);
            tracing::info!(recovery = %key, "Running recovery action");
            if catch_unwind(AssertUnwindSafe(|| action())).is_err() {
                tracing::error!(recovery = %key, "Recovery action panicked");
            }
        }

        outcome
    }

    pub fn get_error_stats(&self) -> ErrorStats {
        let inner = self.lock();
        ErrorStats {
            total: inner.total,
            visible: inner.visible,
            suppressed: inner.suppressed,
            by_message: inner.by_message.clone(),
            by_category: inner.by_category.clone(),
            recoveries: inner.recovery_runs.clone(),
            recent: inner.ring.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for NoiseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("NoiseController")
            .field("total", &inner.total)
            .field("recoveries", &inner.recoveries.len())
            .finish()
    }
}
