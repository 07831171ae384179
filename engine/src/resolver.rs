//! Report value resolution.
//!
//! Turns an alert rule plus a number of periods back into one scalar metric
//! value: computes the target date in the site's timezone, queries the
//! reporting backend, refuses tables whose archive is still being computed,
//! then filters and folds the table down to a single row.

use crate::backend::{QueryOptions, ReportBackend, ReportCatalog, ReportQuery};
use crate::clock::Clock;
use crate::error::AlertError;
use crate::filter::filter_table;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use vigil_shared::types::report::{ArchiveState, ReportTable};
use vigil_shared::types::rule::{AlertRule, FilterCondition, PeriodKind, SiteId};
use vigil_shared::utils::parse_lenient_float;
use vigil_shared::utils::time::subtract_periods;

pub struct ValueResolver {
    backend: Arc<dyn ReportBackend>,
    catalog: Arc<dyn ReportCatalog>,
    clock: Arc<dyn Clock>,
}

impl ValueResolver {
    pub fn new(
        backend: Arc<dyn ReportBackend>,
        catalog: Arc<dyn ReportCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            catalog,
            clock,
        }
    }

    /// Date `periods_back` periods before now at the site. Zero is the
    /// current, still running period.
    pub fn date_in_past(
        &self,
        site_id: SiteId,
        period: PeriodKind,
        periods_back: u32,
    ) -> Result<NaiveDate, AlertError> {
        let now = self.clock.now_in_timezone(site_id);
        subtract_periods(now, periods_back, period)
            .map(|dt| dt.date())
            .ok_or(AlertError::DateOutOfRange {
                period,
                periods_back,
            })
    }

    /// Metric value of `rule`'s report `periods_back` periods ago.
    ///
    /// `Ok(None)` means the report had no matching row or no such column.
    pub async fn value_in_past(
        &self,
        rule: &AlertRule,
        site_id: SiteId,
        periods_back: u32,
    ) -> Result<Option<f64>, AlertError> {
        let report = self
            .catalog
            .report_metadata(site_id, &rule.report)
            .ok_or_else(|| AlertError::ReportNotFound {
                report: rule.report.clone(),
            })?;

        let date = self.date_in_past(site_id, rule.period, periods_back)?;

        let query = ReportQuery {
            method: report.method(),
            site_id,
            period: rule.period,
            date,
            options: QueryOptions::FOR_ALERTS,
            parameters: report.parameters,
        };

        let table = self
            .backend
            .query(&query)
            .await
            .map_err(AlertError::Backend)?;

        check_archive_complete(rule, &table, date)?;

        // the table is consumed here and dropped before the next rule is looked at
        let value = aggregate_to_one_value(table, &rule.metric, rule.label_filter())?;

        debug!(
            rule_id = rule.id,
            site_id,
            period = %rule.period,
            %date,
            periods_back,
            value = ?value,
            "Resolved alert value"
        );

        Ok(value)
    }
}

/// Fail with [`AlertError::ArchiveIncomplete`] unless the table's archive
/// is complete. A table without any archive state counts as complete.
pub fn check_archive_complete(
    rule: &AlertRule,
    table: &ReportTable,
    date: NaiveDate,
) -> Result<(), AlertError> {
    match table.archive_state {
        ArchiveState::Complete | ArchiveState::Absent => Ok(()),
        ArchiveState::Incomplete => Err(AlertError::ArchiveIncomplete {
            rule: rule.name.clone(),
            report: rule.report.clone(),
            date,
        }),
    }
}

/// Reduce a report table to one value of `metric`.
///
/// Rows are first filtered by label if a filter is given. If more than one
/// row remains they are folded into a single summary row, and the metric is
/// read from the first row.
pub fn aggregate_to_one_value(
    mut table: ReportTable,
    metric: &str,
    filter: Option<(&FilterCondition, &str)>,
) -> Result<Option<f64>, AlertError> {
    if let Some((condition, value)) = filter {
        filter_table(&mut table, condition, value)?;
    }

    if table.row_count() > 1 {
        table.truncate(0, metric);
    }

    let Some(row) = table.first_row() else {
        debug!(metric, "Report has no rows left after filtering");
        return Ok(None);
    };

    let value = row.column(metric).and_then(metric_value);
    if value.is_none() {
        debug!(metric, "Metric not present in report row");
    }
    Ok(value)
}

/// Numeric reading of a metric cell. Unit suffixes such as `%` or `s` are
/// stripped from string values.
pub fn metric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let stripped = s.trim().trim_end_matches(&['%', 's'][..]);
            Some(parse_lenient_float(stripped))
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
