//! Alert run orchestration.
//!
//! One run evaluates every rule of a period for one site, in rule id order.
//! Rule failures are collected rather than aborting the run. If any rule hit
//! an incomplete archive the run ends with a single retryable failure and
//! the ids of rules already handled are checkpointed so the retry skips them.
//! Rules whose backend or storage failed are never checkpointed. They ride
//! along with a retry when there is one; otherwise the run ends with a
//! non-retryable failure instead of reporting success.

use crate::audit;
use crate::backend::{ReportBackend, ReportCatalog};
use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::error::{AlertError, CollaboratorFailure, FailedRule, RetryableRunFailure, RunError};
use crate::evaluator::should_trigger;
use crate::metrics::{ALERTS_TRIGGERED, RULE_OUTCOMES, RUNS_TOTAL, RUN_DURATION};
use crate::recorder::{RecordOutcome, TriggeredAlertRecorder};
use crate::resolver::ValueResolver;
use crate::storage::RuleStore;
use crate::task::RunContext;
use crate::validator::{RuleValidator, SkipReason};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vigil_shared::types::rule::{AlertRule, PeriodKind, RuleId, SiteId};
use vigil_shared::utils::time::is_leap_year;

/// What happened to one rule during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Triggered {
        value_new: f64,
        value_old: Option<f64>,
    },
    /// The condition held but this occurrence was already recorded.
    AlreadyTriggered,
    NotTriggered,
    /// Handled by an earlier attempt of the same retry sequence.
    AlreadyProcessed,
    Skipped(SkipReason),
    /// Retryable; the whole run will be retried.
    Failed(String),
    /// The rule itself cannot be evaluated; logged and left alone.
    Errored(String),
    /// The backend or storage failed; the run is reported as failed.
    Unavailable(String),
}

impl RuleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggered { .. } => "triggered",
            Self::AlreadyTriggered | Self::AlreadyProcessed => "already_processed",
            Self::NotTriggered => "not_triggered",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::Errored(_) => "errored",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule_id: RuleId,
    pub name: String,
    pub outcome: RuleOutcome,
}

/// Per-rule outcomes of a run that did not request a retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub period: PeriodKind,
    pub site_id: SiteId,
    pub retry_count: u32,
    pub rules: Vec<RuleReport>,
}

impl RunSummary {
    pub fn count(&self, outcome: &str) -> usize {
        self.rules
            .iter()
            .filter(|r| r.outcome.as_str() == outcome)
            .count()
    }

    pub fn triggered(&self) -> impl Iterator<Item = &RuleReport> {
        self.rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Triggered { .. }))
    }

    pub fn outcome_of(&self, rule_id: RuleId) -> Option<&RuleOutcome> {
        self.rules
            .iter()
            .find(|r| r.rule_id == rule_id)
            .map(|r| &r.outcome)
    }
}

/// Baseline offset in periods. Same-day-last-year comparisons use 366 days
/// when today is in a leap year.
pub fn effective_compared_to(rule: &AlertRule, today_is_leap_year: bool) -> u32 {
    if rule.compared_to == 365 && today_is_leap_year {
        366
    } else {
        rule.compared_to
    }
}

pub struct AlertProcessor {
    store: Arc<dyn RuleStore>,
    resolver: ValueResolver,
    validator: RuleValidator,
    recorder: TriggeredAlertRecorder,
    checkpoints: CheckpointStore,
    clock: Arc<dyn Clock>,
}

impl AlertProcessor {
    pub fn new(
        store: Arc<dyn RuleStore>,
        backend: Arc<dyn ReportBackend>,
        catalog: Arc<dyn ReportCatalog>,
        clock: Arc<dyn Clock>,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            resolver: ValueResolver::new(backend, catalog.clone(), clock.clone()),
            validator: RuleValidator::new(catalog),
            recorder: TriggeredAlertRecorder::new(store.clone()),
            store,
            checkpoints,
            clock,
        }
    }

    /// Evaluate all rules of `ctx.period` for `ctx.site_id`.
    pub async fn run_alerts(&self, ctx: &RunContext) -> Result<RunSummary, RunError> {
        let _timer = RUN_DURATION.start_timer();

        let rules = match self.store.rules_for_period(ctx.period).await {
            Ok(rules) => rules,
            Err(e) => {
                RUNS_TOTAL.with_label_values(&["error"]).inc();
                return Err(RunError::Storage(e));
            }
        };

        let already_processed = if ctx.is_retry() {
            self.checkpoints.load(ctx.period, ctx.site_id).await
        } else {
            Vec::new()
        };
        // consumed either way; a failing run writes a fresh one below
        if let Err(e) = self.checkpoints.clear(ctx.period, ctx.site_id).await {
            warn!(period = %ctx.period, site_id = ctx.site_id, error = %e, "Failed to clear retry checkpoint");
        }

        info!(
            period = %ctx.period,
            site_id = ctx.site_id,
            retry_count = ctx.retry_count,
            rules = rules.len(),
            already_processed = already_processed.len(),
            "Starting alert run"
        );

        let mut reports = Vec::with_capacity(rules.len());
        let mut processed = Vec::with_capacity(rules.len());
        let mut failed = Vec::new();
        let mut unavailable = Vec::new();

        for rule in &rules {
            let outcome = if already_processed.contains(&rule.id) {
                debug!(rule_id = rule.id, "Rule handled by a previous attempt");
                RuleOutcome::AlreadyProcessed
            } else {
                self.process_rule(rule, ctx.site_id).await
            };

            RULE_OUTCOMES.with_label_values(&[outcome.as_str()]).inc();
            match &outcome {
                RuleOutcome::Failed(reason) => failed.push(FailedRule {
                    rule_id: rule.id,
                    name: rule.name.clone(),
                    reason: reason.clone(),
                }),
                // never checkpointed, so a later run evaluates it again
                RuleOutcome::Unavailable(reason) => unavailable.push(FailedRule {
                    rule_id: rule.id,
                    name: rule.name.clone(),
                    reason: reason.clone(),
                }),
                _ => processed.push(rule.id),
            }

            reports.push(RuleReport {
                rule_id: rule.id,
                name: rule.name.clone(),
                outcome,
            });
        }

        if failed.is_empty() && unavailable.is_empty() {
            RUNS_TOTAL.with_label_values(&["done"]).inc();
            let summary = RunSummary {
                period: ctx.period,
                site_id: ctx.site_id,
                retry_count: ctx.retry_count,
                rules: reports,
            };
            info!(
                period = %ctx.period,
                site_id = ctx.site_id,
                triggered = summary.count("triggered"),
                "Alert run complete"
            );
            return Ok(summary);
        }

        if failed.is_empty() {
            RUNS_TOTAL.with_label_values(&["error"]).inc();
            let failure = CollaboratorFailure {
                period: ctx.period,
                site_id: ctx.site_id,
                failed: unavailable,
            };
            error!(%failure, "Alert run failed");
            return Err(RunError::Collaborator(failure));
        }

        RUNS_TOTAL.with_label_values(&["retry_requested"]).inc();
        failed.extend(unavailable);
        let failure = RetryableRunFailure {
            period: ctx.period,
            site_id: ctx.site_id,
            retry_count: ctx.retry_count,
            failed,
        };

        if ctx.is_final_retry() {
            // the scheduler stops here, so no checkpoint is kept
            error!(
                period = %ctx.period,
                site_id = ctx.site_id,
                retry_count = ctx.retry_count,
                "Final retry of alerts task. Unable to process the following alerts: {}",
                failure.rule_names().join(", ")
            );
            audit::final_retry_exhausted(ctx.period, ctx.site_id, ctx.retry_count, &failure.rule_names());
        } else {
            match self.checkpoints.save(ctx.period, ctx.site_id, &processed).await {
                Ok(()) => audit::checkpoint_saved(ctx.period, ctx.site_id, ctx.retry_count, &processed),
                Err(e) => warn!(
                    period = %ctx.period,
                    site_id = ctx.site_id,
                    error = %e,
                    "Failed to save retry checkpoint, the retry will re-evaluate all rules"
                ),
            }
            warn!(%failure, "Alert run requests a retry");
        }

        Err(RunError::Retryable(failure))
    }

    async fn process_rule(&self, rule: &AlertRule, site_id: SiteId) -> RuleOutcome {
        if let Err(reason) = self.validator.check_processable(rule, site_id) {
            debug!(rule_id = rule.id, site_id, reason = %reason, "Skipping alert");
            return RuleOutcome::Skipped(reason);
        }

        match self.evaluate_rule(rule, site_id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                warn!(rule_id = rule.id, site_id, error = %e, "Alert deferred");
                RuleOutcome::Failed(e.to_string())
            }
            Err(AlertError::ReportNotFound { report }) => {
                debug!(rule_id = rule.id, site_id, %report, "Skipping alert, report vanished");
                RuleOutcome::Skipped(SkipReason::ReportNotFound { report })
            }
            Err(e) if e.is_collaborator_failure() => {
                error!(rule_id = rule.id, site_id, error = %e, "Backend unavailable for alert");
                RuleOutcome::Unavailable(e.to_string())
            }
            Err(e) => {
                error!(rule_id = rule.id, site_id, error = %e, "Failed to evaluate alert");
                RuleOutcome::Errored(e.to_string())
            }
        }
    }

    async fn evaluate_rule(&self, rule: &AlertRule, site_id: SiteId) -> Result<RuleOutcome, AlertError> {
        let value_new = self
            .resolver
            .value_in_past(rule, site_id, 1)
            .await?
            .unwrap_or(0.0);

        let now = self.clock.now();
        let compared_to = effective_compared_to(rule, is_leap_year(now.date_naive()));
        let value_old = self
            .resolver
            .value_in_past(rule, site_id, 1 + compared_to)
            .await?;

        let fires = should_trigger(
            &rule.metric_condition,
            rule.metric_matched.value(),
            Some(value_new),
            value_old,
        )?;

        debug!(
            rule_id = rule.id,
            site_id,
            value_new,
            value_old = ?value_old,
            fires,
            "Evaluated alert"
        );

        if !fires {
            return Ok(RuleOutcome::NotTriggered);
        }

        let report_date = self.resolver.date_in_past(site_id, rule.period, 1)?;
        match self
            .recorder
            .record(rule, site_id, value_new, value_old, report_date, now)
            .await?
        {
            RecordOutcome::Recorded => {
                ALERTS_TRIGGERED.inc();
                Ok(RuleOutcome::Triggered {
                    value_new,
                    value_old,
                })
            }
            RecordOutcome::Duplicate => Ok(RuleOutcome::AlreadyTriggered),
        }
    }
}
