//! Audit events for alert runs.
//!
//! Emitted via `tracing` on a dedicated target so they can be routed to an
//! audit pipeline separately from operational logs.

use chrono::NaiveDate;
use tracing::{error, info};
use vigil_shared::types::rule::{AlertRule, PeriodKind, RuleId, SiteId};

pub const AUDIT_TARGET: &str = "vigil::audit";

/// A rule fired and its occurrence was stored.
pub fn alert_triggered(
    rule: &AlertRule,
    site_id: SiteId,
    value_new: f64,
    value_old: Option<f64>,
    report_date: NaiveDate,
) {
    info!(
        target: AUDIT_TARGET,
        event = "alert_triggered",
        rule_id = rule.id,
        rule = %rule.name,
        login = %rule.login,
        site_id,
        period = %rule.period,
        condition = %rule.metric_condition,
        value_new,
        value_old = ?value_old,
        %report_date,
    );
}

/// A failed run stored the ids of rules it already handled.
pub fn checkpoint_saved(period: PeriodKind, site_id: SiteId, retry_count: u32, processed: &[RuleId]) {
    info!(
        target: AUDIT_TARGET,
        event = "checkpoint_saved",
        %period,
        site_id,
        retry_count,
        processed = ?processed,
    );
}

/// The last allowed retry still left rules unevaluated.
pub fn final_retry_exhausted(period: PeriodKind, site_id: SiteId, retry_count: u32, rules: &[&str]) {
    error!(
        target: AUDIT_TARGET,
        event = "final_retry_exhausted",
        %period,
        site_id,
        retry_count,
        rules = %rules.join(", "),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_target_is_static() {
        assert_eq!(AUDIT_TARGET, "vigil::audit");
    }
}
