//! Triggered-alert recording

use crate::audit;
use crate::error::AlertError;
use crate::storage::RuleStore;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;
use vigil_shared::types::rule::{AlertRule, SiteId};
use vigil_shared::types::trigger::TriggeredAlert;

/// Outcome of [`TriggeredAlertRecorder::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A trigger for the same rule, site and report date already exists.
    Duplicate,
}

pub struct TriggeredAlertRecorder {
    store: Arc<dyn RuleStore>,
}

impl TriggeredAlertRecorder {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Persist that `rule` fired for `site_id` on the data of `report_date`.
    pub async fn record(
        &self,
        rule: &AlertRule,
        site_id: SiteId,
        value_new: f64,
        value_old: Option<f64>,
        report_date: NaiveDate,
        ts_triggered: DateTime<Utc>,
    ) -> Result<RecordOutcome, AlertError> {
        let existing = self
            .store
            .triggered_alerts(rule.id, site_id)
            .await
            .map_err(AlertError::Storage)?;

        if existing
            .iter()
            .any(|t| t.same_occurrence(rule.id, site_id, report_date))
        {
            debug!(rule_id = rule.id, site_id, %report_date, "Alert already triggered for this date");
            return Ok(RecordOutcome::Duplicate);
        }

        let alert = TriggeredAlert {
            rule_id: rule.id,
            site_id,
            value_new,
            value_old,
            report_date,
            ts_triggered,
        };
        self.store
            .record_trigger(alert)
            .await
            .map_err(AlertError::Storage)?;

        audit::alert_triggered(rule, site_id, value_new, value_old, report_date);
        Ok(RecordOutcome::Recorded)
    }
}
