//! Rule eligibility checks

use crate::backend::ReportCatalog;
use std::fmt;
use std::sync::Arc;
use vigil_shared::types::rule::{comparables_for, AlertRule, PeriodKind, SiteId};

/// Why a rule is not evaluated for a run. Never a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SiteNotInScope,
    InvalidComparableDate { period: PeriodKind, compared_to: u32 },
    ReportNotFound { report: String },
    MetricNotInReport { report: String, metric: String },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteNotInScope => "site_not_in_scope",
            Self::InvalidComparableDate { .. } => "invalid_comparable_date",
            Self::ReportNotFound { .. } => "report_not_found",
            Self::MetricNotInReport { .. } => "metric_not_in_report",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SiteNotInScope => f.write_str("site not in rule scope"),
            Self::InvalidComparableDate {
                period,
                compared_to,
            } => write!(f, "{} compared to {} back is not a valid comparison", period, compared_to),
            Self::ReportNotFound { report } => write!(f, "report {} not found", report),
            Self::MetricNotInReport { report, metric } => {
                write!(f, "metric {} not available in report {}", metric, report)
            }
        }
    }
}

/// Whether `compared_to` periods back is an offered comparison for `period`.
pub fn is_valid_comparable_date(period: PeriodKind, compared_to: u32) -> bool {
    comparables_for(period).any(|c| c.compared_to == compared_to)
}

pub struct RuleValidator {
    catalog: Arc<dyn ReportCatalog>,
}

impl RuleValidator {
    pub fn new(catalog: Arc<dyn ReportCatalog>) -> Self {
        Self { catalog }
    }

    /// The report must resolve for the site and list the metric.
    pub fn check_report_and_metric(
        &self,
        site_id: SiteId,
        report: &str,
        metric: &str,
    ) -> Result<(), SkipReason> {
        let metadata = self
            .catalog
            .report_metadata(site_id, report)
            .ok_or_else(|| SkipReason::ReportNotFound {
                report: report.to_string(),
            })?;
        if !metadata.has_metric(metric) {
            return Err(SkipReason::MetricNotInReport {
                report: report.to_string(),
                metric: metric.to_string(),
            });
        }
        Ok(())
    }

    /// Gate applied to every rule before it is evaluated for a site.
    pub fn check_processable(&self, rule: &AlertRule, site_id: SiteId) -> Result<(), SkipReason> {
        if !rule.applies_to_site(site_id) {
            return Err(SkipReason::SiteNotInScope);
        }
        if !is_valid_comparable_date(rule.period, rule.compared_to) {
            return Err(SkipReason::InvalidComparableDate {
                period: rule.period,
                compared_to: rule.compared_to,
            });
        }
        self.check_report_and_metric(site_id, &rule.report, &rule.metric)
    }
}
