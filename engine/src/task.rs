//! Scheduler integration.
//!
//! Alert runs are scheduled as tasks named `custom_alerts.run_<period>_<site>`.
//! The scheduler notifies [`TaskTracker`] when a task starts and ends; for
//! alert tasks the tracker hands out the [`RunContext`] the processor needs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, warn};
use vigil_shared::types::rule::{PeriodKind, SiteId};

const TASK_PREFIX: &str = "custom_alerts.run_";

/// Identity of one alert run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub period: PeriodKind,
    pub site_id: SiteId,
}

impl RunKey {
    pub fn new(period: PeriodKind, site_id: SiteId) -> Self {
        Self { period, site_id }
    }

    pub fn task_name(&self) -> String {
        format!("{}{}_{}", TASK_PREFIX, self.period, self.site_id)
    }

    /// Parse a scheduler task name. `None` for tasks that are not alert runs.
    pub fn parse(task_name: &str) -> Option<Self> {
        let rest = task_name.strip_prefix(TASK_PREFIX)?;
        let (period, site) = rest.split_once('_')?;
        Some(Self {
            period: period.parse().ok()?,
            site_id: site.parse().ok()?,
        })
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.task_name())
    }
}

/// Explicit context for one invocation of an alert run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub period: PeriodKind,
    pub site_id: SiteId,
    /// 0 on the first attempt.
    pub retry_count: u32,
    pub max_retries: u32,
}

impl RunContext {
    pub fn new(period: PeriodKind, site_id: SiteId, retry_count: u32, max_retries: u32) -> Self {
        Self {
            period,
            site_id,
            retry_count,
            max_retries,
        }
    }

    pub fn key(&self) -> RunKey {
        RunKey::new(self.period, self.site_id)
    }

    pub fn is_retry(&self) -> bool {
        self.retry_count > 0
    }

    /// The scheduler will not re-invoke this run after a failure.
    pub fn is_final_retry(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Scheduler-side retry bookkeeping.
pub trait RetryTimetable: Send + Sync {
    /// How many times `task_name` has been retried so far.
    fn retry_count(&self, task_name: &str) -> u32;
}

/// Retry counts supplied up front, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticRetryTimetable {
    counts: HashMap<String, u32>,
}

impl StaticRetryTimetable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, task_name: impl Into<String>, retry_count: u32) -> Self {
        self.counts.insert(task_name.into(), retry_count);
        self
    }
}

impl RetryTimetable for StaticRetryTimetable {
    fn retry_count(&self, task_name: &str) -> u32 {
        self.counts.get(task_name).copied().unwrap_or(0)
    }
}

/// Tracks which alert runs are in flight.
pub struct TaskTracker {
    max_retries: u32,
    running: Mutex<HashMap<RunKey, RunContext>>,
}

impl TaskTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Called when the scheduler starts a task. Returns the run context for
    /// alert tasks and `None` for any other task.
    pub fn starting(&self, task_name: &str, timetable: &dyn RetryTimetable) -> Option<RunContext> {
        let key = RunKey::parse(task_name)?;
        let ctx = RunContext::new(
            key.period,
            key.site_id,
            timetable.retry_count(task_name),
            self.max_retries,
        );

        match self.running.lock() {
            Ok(mut running) => {
                if running.insert(key, ctx).is_some() {
                    warn!(task = task_name, "Alert task started while a previous run is still tracked");
                }
            }
            Err(e) => warn!(task = task_name, error = %e, "Task tracker lock poisoned"),
        }

        debug!(task = task_name, retry_count = ctx.retry_count, "Alert task starting");
        Some(ctx)
    }

    /// Called when the scheduler finishes a task, successfully or not.
    pub fn ending(&self, task_name: &str) -> Option<RunContext> {
        let key = RunKey::parse(task_name)?;
        let ended = self.running.lock().ok()?.remove(&key);
        if ended.is_some() {
            debug!(task = task_name, "Alert task ended");
        }
        ended
    }

    pub fn current(&self, key: RunKey) -> Option<RunContext> {
        self.running.lock().ok()?.get(&key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_name_round_trip() {
        let key = RunKey::new(PeriodKind::Week, 42);
        assert_eq!(key.task_name(), "custom_alerts.run_week_42");
        assert_eq!(RunKey::parse("custom_alerts.run_week_42"), Some(key));
    }

    #[test]
    fn test_parse_rejects_other_tasks() {
        assert_eq!(RunKey::parse("core_archive.run_day_1"), None);
        assert_eq!(RunKey::parse("custom_alerts.run_year_1"), None);
        assert_eq!(RunKey::parse("custom_alerts.run_day_x"), None);
        assert_eq!(RunKey::parse("custom_alerts.run_day"), None);
    }

    #[test]
    fn test_final_retry() {
        assert!(!RunContext::new(PeriodKind::Day, 1, 0, 3).is_final_retry());
        assert!(!RunContext::new(PeriodKind::Day, 1, 2, 3).is_final_retry());
        assert!(RunContext::new(PeriodKind::Day, 1, 3, 3).is_final_retry());
    }

    #[test]
    fn test_tracker_start_and_end() {
        let tracker = TaskTracker::new(3);
        let timetable = StaticRetryTimetable::new().with_count("custom_alerts.run_day_7", 2);

        assert!(tracker.starting("other.task", &timetable).is_none());

        let ctx = tracker.starting("custom_alerts.run_day_7", &timetable).unwrap();
        assert_eq!(ctx, RunContext::new(PeriodKind::Day, 7, 2, 3));
        assert_eq!(tracker.current(ctx.key()), Some(ctx));

        // runs for other keys are independent
        let other = tracker.starting("custom_alerts.run_month_7", &timetable).unwrap();
        assert_eq!(other.retry_count, 0);

        assert_eq!(tracker.ending("custom_alerts.run_day_7"), Some(ctx));
        assert_eq!(tracker.current(ctx.key()), None);
        assert_eq!(tracker.current(other.key()), Some(other));
        assert_eq!(tracker.ending("custom_alerts.run_day_7"), None);
    }
}
