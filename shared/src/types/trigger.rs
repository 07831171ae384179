//! Triggered alert records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::rule::{RuleId, SiteId};

/// A persisted occurrence of a rule's condition being met.
///
/// Created once by the recorder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub rule_id: RuleId,
    pub site_id: SiteId,

    /// Value for the most recent complete period.
    pub value_new: f64,

    /// Baseline value, `None` when the report had no data for it.
    pub value_old: Option<f64>,

    /// Date the new value was read for (site timezone).
    pub report_date: NaiveDate,

    pub ts_triggered: DateTime<Utc>,
}

impl TriggeredAlert {
    /// True if this record is for the same rule, site and report date.
    pub fn same_occurrence(&self, rule_id: RuleId, site_id: SiteId, report_date: NaiveDate) -> bool {
        self.rule_id == rule_id && self.site_id == site_id && self.report_date == report_date
    }
}
