//! Error types for alert evaluation

use chrono::NaiveDate;
use std::fmt;
use vigil_shared::types::rule::{PeriodKind, RuleId, SiteId};

/// Failure while evaluating a single rule.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The rule names a trigger or filter condition this version does not know.
    #[error("Condition not supported: {kind}")]
    UnsupportedCondition { kind: String },

    /// The rule's report reference does not resolve in the catalog.
    #[error("Could not find report for alert '{report}'")]
    ReportNotFound { report: String },

    /// The archive behind the report has not finished computing. Retryable.
    #[error("The alert '{rule}' is unable to process because archiving is not complete for report: {report} ({date})")]
    ArchiveIncomplete {
        rule: String,
        report: String,
        date: NaiveDate,
    },

    #[error("Invalid label filter pattern '{pattern}': {source}")]
    InvalidFilterPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The site's clock could not be stepped back the requested number of periods.
    #[error("Cannot compute a date {periods_back} {period}(s) in the past")]
    DateOutOfRange { period: PeriodKind, periods_back: u32 },

    #[error("Reporting backend error: {0:#}")]
    Backend(anyhow::Error),

    #[error("Rule storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl AlertError {
    /// Whether trying the same run again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ArchiveIncomplete { .. })
    }

    /// The reporting backend or rule storage failed, not the rule itself.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Storage(_))
    }
}

/// A rule that could not be evaluated during a run and should be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRule {
    pub rule_id: RuleId,
    pub name: String,
    pub reason: String,
}

/// Raised once per run when at least one rule hit an incomplete archive.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryableRunFailure {
    pub period: PeriodKind,
    pub site_id: SiteId,
    pub retry_count: u32,
    pub failed: Vec<FailedRule>,
}

impl RetryableRunFailure {
    pub fn rule_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for RetryableRunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} alert(s) for period={} site={} could not be processed (retry {}): {}",
            self.failed.len(),
            self.period,
            self.site_id,
            self.retry_count,
            self.rule_names().join(", ")
        )
    }
}

impl std::error::Error for RetryableRunFailure {}

/// Raised when the reporting backend or rule storage failed for at least one
/// rule. Those rules are not checkpointed.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorFailure {
    pub period: PeriodKind,
    pub site_id: SiteId,
    pub failed: Vec<FailedRule>,
}

impl fmt::Display for CollaboratorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} alert(s) for period={} site={} failed:",
            self.failed.len(),
            self.period,
            self.site_id
        )?;
        for rule in &self.failed {
            write!(f, " {} ({});", rule.name, rule.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for CollaboratorFailure {}

/// Run-level failure.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// One or more rules must be re-attempted; the scheduler should re-invoke
    /// the same (period, site) run later.
    #[error(transparent)]
    Retryable(#[from] RetryableRunFailure),

    /// The reporting backend or storage failed while evaluating rules.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorFailure),

    /// The rule list itself could not be loaded.
    #[error("Failed to load alert rules: {0:#}")]
    Storage(anyhow::Error),
}

impl RunError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_archive_incomplete_is_retryable() {
        let incomplete = AlertError::ArchiveIncomplete {
            rule: "Visits drop".into(),
            report: "VisitsSummary_get".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };
        assert!(incomplete.is_retryable());
        assert!(!AlertError::ReportNotFound { report: "x".into() }.is_retryable());
        assert!(!AlertError::UnsupportedCondition { kind: "x".into() }.is_retryable());
    }

    #[test]
    fn test_collaborator_failures() {
        assert!(AlertError::Backend(anyhow::anyhow!("timeout")).is_collaborator_failure());
        assert!(AlertError::Storage(anyhow::anyhow!("disk full")).is_collaborator_failure());
        assert!(!AlertError::UnsupportedCondition { kind: "x".into() }.is_collaborator_failure());

        let failure = CollaboratorFailure {
            period: PeriodKind::Week,
            site_id: 2,
            failed: vec![FailedRule {
                rule_id: 4,
                name: "Weekly visits".into(),
                reason: "timeout".into(),
            }],
        };
        let err = RunError::from(failure);
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "1 alert(s) for period=week site=2 failed: Weekly visits (timeout);"
        );
    }

    #[test]
    fn test_run_failure_message_names_rules() {
        let failure = RetryableRunFailure {
            period: PeriodKind::Day,
            site_id: 3,
            retry_count: 1,
            failed: vec![
                FailedRule {
                    rule_id: 1,
                    name: "First".into(),
                    reason: "archive".into(),
                },
                FailedRule {
                    rule_id: 2,
                    name: "Second".into(),
                    reason: "archive".into(),
                },
            ],
        };
        let msg = RunError::from(failure).to_string();
        assert!(msg.contains("period=day site=3"));
        assert!(msg.contains("First, Second"));
    }
}
