//! Full alert runs against in-memory collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use vigil_engine::backend::fixture::FixtureBackend;
use vigil_engine::backend::{ReportBackend, ReportQuery};
use vigil_engine::checkpoint::CheckpointStore;
use vigil_engine::clock::FixedClock;
use vigil_engine::processor::{AlertProcessor, RuleOutcome};
use vigil_engine::storage::memory::{InMemoryKeyValueStore, InMemoryRuleStore};
use vigil_engine::storage::KeyValueStore;
use vigil_engine::task::{RunContext, StaticRetryTimetable, TaskTracker};
use vigil_engine::validator::SkipReason;
use vigil_engine::RunError;
use vigil_shared::types::report::{ArchiveState, ReportMetadata, ReportTable, Row};
use vigil_shared::types::rule::{
    AlertRule, FilterCondition, MetricCondition, PeriodKind, RuleId, SiteId, Threshold,
};

const VISITS: &str = "VisitsSummary.get";
const PAGES: &str = "Actions.getPageUrls";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn visits_table(nb_visits: i64) -> ReportTable {
    ReportTable::new(vec![Row::new().with("label", "-").with("nb_visits", nb_visits)])
        .with_archive_state(ArchiveState::Complete)
}

fn pages_table(state: ArchiveState) -> ReportTable {
    ReportTable::new(vec![
        Row::new().with("label", "/index").with("nb_hits", 12),
        Row::new().with("label", "/blog/post").with("nb_hits", 3),
    ])
    .with_archive_state(state)
}

fn metadata(module: &str, action: &str, metric: &str) -> ReportMetadata {
    ReportMetadata {
        module: module.into(),
        action: action.into(),
        name: format!("{module} {action}"),
        parameters: Default::default(),
        metrics: vec![metric.into()],
    }
}

fn rule(id: RuleId, report: &str, metric: &str, condition: MetricCondition, threshold: f64) -> AlertRule {
    AlertRule {
        id,
        name: format!("alert {id}"),
        login: "admin".into(),
        id_sites: vec![1],
        period: PeriodKind::Day,
        compared_to: 1,
        email_me: true,
        additional_emails: vec![],
        phone_numbers: vec![],
        report: report.into(),
        metric: metric.into(),
        metric_condition: condition,
        metric_matched: Threshold(threshold),
        report_condition: None,
        report_matched: None,
    }
}

fn visits_rule(id: RuleId, condition: MetricCondition, threshold: f64) -> AlertRule {
    rule(id, "VisitsSummary_get", "nb_visits", condition, threshold)
}

fn pages_rule(id: RuleId) -> AlertRule {
    rule(id, "Actions_getPageUrls", "nb_hits", MetricCondition::GreaterThan, 1.0)
}

/// Times out on every query for one report method.
struct OutageBackend {
    inner: Arc<FixtureBackend>,
    method: &'static str,
}

#[async_trait]
impl ReportBackend for OutageBackend {
    async fn query(&self, query: &ReportQuery) -> Result<ReportTable> {
        if query.method == self.method {
            return Err(anyhow!("backend timed out"));
        }
        self.inner.query(query).await
    }
}

/// Reads and deletes work, writes fail.
struct WriteRefusingStore(Arc<InMemoryKeyValueStore>);

#[async_trait]
impl KeyValueStore for WriteRefusingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key).await
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("read-only medium"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.0.delete(key).await
    }
}

struct Harness {
    backend: Arc<FixtureBackend>,
    store: Arc<InMemoryRuleStore>,
    medium: Arc<InMemoryKeyValueStore>,
    processor: AlertProcessor,
}

impl Harness {
    /// Clock frozen at 2024-05-10 08:00 UTC; "yesterday" is 2024-05-09.
    fn new(rules: Vec<AlertRule>, backend: FixtureBackend) -> Self {
        Self::at(rules, backend, Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap())
    }

    fn at(rules: Vec<AlertRule>, backend: FixtureBackend, now: chrono::DateTime<Utc>) -> Self {
        Self::build(rules, backend, now, None, false)
    }

    /// Queries for `method` time out.
    fn with_outage(rules: Vec<AlertRule>, backend: FixtureBackend, method: &'static str) -> Self {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        Self::build(rules, backend, now, Some(method), false)
    }

    /// Checkpoints cannot be written.
    fn with_read_only_checkpoints(rules: Vec<AlertRule>, backend: FixtureBackend) -> Self {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        Self::build(rules, backend, now, None, true)
    }

    fn build(
        rules: Vec<AlertRule>,
        backend: FixtureBackend,
        now: chrono::DateTime<Utc>,
        outage: Option<&'static str>,
        read_only_checkpoints: bool,
    ) -> Self {
        let backend = Arc::new(
            backend
                .with_report("VisitsSummary_get", metadata("VisitsSummary", "get", "nb_visits"))
                .with_report("Actions_getPageUrls", metadata("Actions", "getPageUrls", "nb_hits")),
        );
        let store = Arc::new(InMemoryRuleStore::new(rules));
        let medium = Arc::new(InMemoryKeyValueStore::new());
        let reports: Arc<dyn ReportBackend> = match outage {
            Some(method) => Arc::new(OutageBackend {
                inner: backend.clone(),
                method,
            }),
            None => backend.clone(),
        };
        let checkpoints: Arc<dyn KeyValueStore> = if read_only_checkpoints {
            Arc::new(WriteRefusingStore(medium.clone()))
        } else {
            medium.clone()
        };
        let processor = AlertProcessor::new(
            store.clone(),
            reports,
            backend.clone(),
            Arc::new(FixedClock::new(now)),
            CheckpointStore::new(checkpoints),
        );
        Self {
            backend,
            store,
            medium,
            processor,
        }
    }

    async fn checkpoint(&self, site_id: SiteId) -> Option<String> {
        self.medium
            .get(&CheckpointStore::key(PeriodKind::Day, site_id))
            .await
            .unwrap()
    }
}

fn ctx(retry_count: u32) -> RunContext {
    RunContext::new(PeriodKind::Day, 1, retry_count, 3)
}

#[tokio::test]
async fn test_rule_triggers_and_is_recorded() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 8), visits_table(30));
    let h = Harness::new(
        vec![
            visits_rule(1, MetricCondition::LessThan, 20.0),
            visits_rule(2, MetricCondition::GreaterThan, 20.0),
        ],
        backend,
    );

    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();
    assert_eq!(
        summary.outcome_of(1),
        Some(&RuleOutcome::Triggered {
            value_new: 10.0,
            value_old: Some(30.0)
        })
    );
    assert_eq!(summary.outcome_of(2), Some(&RuleOutcome::NotTriggered));

    let triggered = h.store.all_triggered().unwrap();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].rule_id, 1);
    assert_eq!(triggered[0].report_date, date(2024, 5, 9));
    assert_eq!(triggered[0].ts_triggered, Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap());
    assert_eq!(h.checkpoint(1).await, None);
}

#[tokio::test]
async fn test_missing_new_value_reads_as_zero() {
    // nothing stored for either date
    let h = Harness::new(vec![visits_rule(1, MetricCondition::LessThan, 20.0)], FixtureBackend::new());
    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();
    assert_eq!(
        summary.outcome_of(1),
        Some(&RuleOutcome::Triggered {
            value_new: 0.0,
            value_old: None
        })
    );
}

#[tokio::test]
async fn test_incomplete_archive_retry_sequence() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete));
    let h = Harness::new(
        vec![visits_rule(1, MetricCondition::LessThan, 20.0), pages_rule(2)],
        backend,
    );

    let err = h.processor.run_alerts(&ctx(0)).await.unwrap_err();
    let RunError::Retryable(failure) = err else {
        panic!("expected a retryable failure");
    };
    assert_eq!(failure.rule_names(), vec!["alert 2"]);
    assert_eq!(failure.failed[0].rule_id, 2);
    assert_eq!(h.checkpoint(1).await.as_deref(), Some("[1]"));
    assert_eq!(h.store.all_triggered().unwrap().len(), 1);

    // archiving finishes before the retry
    h.backend
        .set_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Complete));

    let summary = h.processor.run_alerts(&ctx(1)).await.unwrap();
    assert_eq!(summary.outcome_of(1), Some(&RuleOutcome::AlreadyProcessed));
    assert_eq!(
        summary.outcome_of(2),
        Some(&RuleOutcome::Triggered {
            value_new: 15.0,
            value_old: None
        })
    );
    assert_eq!(h.checkpoint(1).await, None);

    let rule_ids: Vec<RuleId> = h.store.all_triggered().unwrap().iter().map(|t| t.rule_id).collect();
    assert_eq!(rule_ids, vec![1, 2]);
}

#[tokio::test]
async fn test_failures_are_collected_not_short_circuited() {
    let backend = FixtureBackend::new()
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete))
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10));
    let h = Harness::new(
        vec![
            pages_rule(1),
            visits_rule(2, MetricCondition::LessThan, 20.0),
            pages_rule(3),
        ],
        backend,
    );

    let Err(RunError::Retryable(failure)) = h.processor.run_alerts(&ctx(0)).await else {
        panic!("expected a retryable failure");
    };
    let failed: Vec<RuleId> = failure.failed.iter().map(|f| f.rule_id).collect();
    assert_eq!(failed, vec![1, 3]);
    // the rule between the two failures was still evaluated
    assert_eq!(h.store.all_triggered().unwrap()[0].rule_id, 2);
    assert_eq!(h.checkpoint(1).await.as_deref(), Some("[2]"));
}

#[tokio::test]
async fn test_checkpoint_only_read_on_retries() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10));
    let h = Harness::new(vec![visits_rule(1, MetricCondition::LessThan, 20.0)], backend);

    // left over from an abandoned sequence
    h.medium
        .set(&CheckpointStore::key(PeriodKind::Day, 1), "[1]")
        .await
        .unwrap();

    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();
    assert!(matches!(summary.outcome_of(1), Some(RuleOutcome::Triggered { .. })));
    assert_eq!(h.checkpoint(1).await, None);
}

#[tokio::test]
async fn test_malformed_checkpoint_evaluates_everything() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10));
    let h = Harness::new(vec![visits_rule(1, MetricCondition::LessThan, 20.0)], backend);
    h.medium
        .set(&CheckpointStore::key(PeriodKind::Day, 1), "{garbage")
        .await
        .unwrap();

    let summary = h.processor.run_alerts(&ctx(2)).await.unwrap();
    assert!(matches!(summary.outcome_of(1), Some(RuleOutcome::Triggered { .. })));
}

#[tokio::test]
async fn test_repeated_run_does_not_duplicate_triggers() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10));
    let h = Harness::new(vec![visits_rule(1, MetricCondition::LessThan, 20.0)], backend);

    h.processor.run_alerts(&ctx(0)).await.unwrap();
    let again = h.processor.run_alerts(&ctx(0)).await.unwrap();

    assert_eq!(again.outcome_of(1), Some(&RuleOutcome::AlreadyTriggered));
    assert_eq!(h.store.all_triggered().unwrap().len(), 1);
}

#[tokio::test]
async fn test_final_retry_keeps_failing_without_checkpoint() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete));
    let h = Harness::new(
        vec![visits_rule(1, MetricCondition::LessThan, 20.0), pages_rule(2)],
        backend,
    );

    let err = h.processor.run_alerts(&ctx(3)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.checkpoint(1).await, None);
}

#[tokio::test]
async fn test_backend_outage_fails_the_run() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Complete));
    let h = Harness::with_outage(
        vec![visits_rule(1, MetricCondition::LessThan, 20.0), pages_rule(2)],
        backend,
        PAGES,
    );

    let err = h.processor.run_alerts(&ctx(0)).await.unwrap_err();
    assert!(!err.is_retryable());
    let RunError::Collaborator(failure) = err else {
        panic!("expected a backend failure");
    };
    assert_eq!(failure.failed.len(), 1);
    assert_eq!(failure.failed[0].rule_id, 2);
    assert!(failure.failed[0].reason.contains("backend timed out"));

    // healthy rules are still evaluated and nothing is checkpointed
    assert_eq!(h.store.all_triggered().unwrap()[0].rule_id, 1);
    assert_eq!(h.checkpoint(1).await, None);
}

#[tokio::test]
async fn test_backend_outage_joins_a_pending_retry() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete));
    let h = Harness::with_outage(
        vec![
            visits_rule(1, MetricCondition::LessThan, 20.0),
            pages_rule(2),
            visits_rule(3, MetricCondition::GreaterThan, 100.0),
        ],
        backend,
        VISITS,
    );

    let Err(RunError::Retryable(failure)) = h.processor.run_alerts(&ctx(0)).await else {
        panic!("expected a retryable failure");
    };
    let failed: Vec<RuleId> = failure.failed.iter().map(|f| f.rule_id).collect();
    assert_eq!(failed, vec![2, 1, 3]);
    // the unavailable rules are left for the retry to evaluate
    assert_eq!(h.checkpoint(1).await.as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_unwritable_checkpoint_still_requests_retry() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete));
    let h = Harness::with_read_only_checkpoints(
        vec![visits_rule(1, MetricCondition::LessThan, 20.0), pages_rule(2)],
        backend,
    );

    let Err(RunError::Retryable(failure)) = h.processor.run_alerts(&ctx(0)).await else {
        panic!("expected a retryable failure");
    };
    assert_eq!(failure.rule_names(), vec!["alert 2"]);
    assert_eq!(h.checkpoint(1).await, None);

    // without a checkpoint the retry re-evaluates everything, deduplicated
    h.backend
        .set_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Complete));
    let summary = h.processor.run_alerts(&ctx(1)).await.unwrap();
    assert_eq!(summary.outcome_of(1), Some(&RuleOutcome::AlreadyTriggered));
    assert!(matches!(summary.outcome_of(2), Some(RuleOutcome::Triggered { .. })));
    assert_eq!(h.store.all_triggered().unwrap().len(), 2);
}

#[tokio::test]
async fn test_leap_year_baseline_is_same_date_previous_year() {
    // 2024 is a leap year: the baseline is read 1 + 366 days back, not 1 + 365
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(VISITS, 1, PeriodKind::Day, date(2023, 5, 9), visits_table(100))
        .with_table(VISITS, 1, PeriodKind::Day, date(2023, 5, 10), visits_table(12));
    let mut yearly = visits_rule(1, MetricCondition::DecreaseMoreThan, 50.0);
    yearly.compared_to = 365;
    let h = Harness::new(vec![yearly], backend);

    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();
    assert_eq!(
        summary.outcome_of(1),
        Some(&RuleOutcome::Triggered {
            value_new: 10.0,
            value_old: Some(100.0)
        })
    );
}

#[tokio::test]
async fn test_non_leap_year_baseline_is_same_date_previous_year() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2023, 5, 9), visits_table(10))
        .with_table(VISITS, 1, PeriodKind::Day, date(2022, 5, 9), visits_table(100));
    let mut yearly = visits_rule(1, MetricCondition::DecreaseMoreThan, 50.0);
    yearly.compared_to = 365;
    let h = Harness::at(
        vec![yearly],
        backend,
        Utc.with_ymd_and_hms(2023, 5, 10, 8, 0, 0).unwrap(),
    );

    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();
    assert_eq!(
        summary.outcome_of(1),
        Some(&RuleOutcome::Triggered {
            value_new: 10.0,
            value_old: Some(100.0)
        })
    );
}

#[tokio::test]
async fn test_ineligible_rules_are_skipped_silently() {
    let mut other_site = visits_rule(1, MetricCondition::LessThan, 20.0);
    other_site.id_sites = vec![2];
    let mut bad_offset = visits_rule(2, MetricCondition::LessThan, 20.0);
    bad_offset.compared_to = 30;
    let unknown_metric = rule(3, "VisitsSummary_get", "nb_actions", MetricCondition::LessThan, 20.0);
    let unknown_report = rule(4, "Nope_nope", "nb_visits", MetricCondition::LessThan, 20.0);
    let mut weekly = visits_rule(5, MetricCondition::LessThan, 20.0);
    weekly.period = PeriodKind::Week;

    let h = Harness::new(
        vec![other_site, bad_offset, unknown_metric, unknown_report, weekly],
        FixtureBackend::new(),
    );
    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();

    assert_eq!(summary.outcome_of(1), Some(&RuleOutcome::Skipped(SkipReason::SiteNotInScope)));
    assert!(matches!(
        summary.outcome_of(2),
        Some(RuleOutcome::Skipped(SkipReason::InvalidComparableDate { compared_to: 30, .. }))
    ));
    assert!(matches!(
        summary.outcome_of(3),
        Some(RuleOutcome::Skipped(SkipReason::MetricNotInReport { .. }))
    ));
    assert!(matches!(
        summary.outcome_of(4),
        Some(RuleOutcome::Skipped(SkipReason::ReportNotFound { .. }))
    ));
    // loaded per period, so the weekly rule is not part of a daily run
    assert_eq!(summary.outcome_of(5), None);
    assert_eq!(summary.count("skipped"), 4);
    assert!(h.store.all_triggered().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_conditions_error_without_retry() {
    let backend = FixtureBackend::new()
        .with_table(VISITS, 1, PeriodKind::Day, date(2024, 5, 9), visits_table(10))
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Complete));
    let broken_trigger = visits_rule(1, MetricCondition::from("not_a_condition"), 1.0);
    let mut broken_filter = pages_rule(2);
    broken_filter.report_condition = Some(FilterCondition::from("sounds_like"));
    broken_filter.report_matched = Some("index".into());
    let fine = visits_rule(3, MetricCondition::LessThan, 20.0);

    let h = Harness::new(vec![broken_trigger, broken_filter, fine], backend);
    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();

    assert!(matches!(summary.outcome_of(1), Some(RuleOutcome::Errored(_))));
    assert!(matches!(summary.outcome_of(2), Some(RuleOutcome::Errored(_))));
    assert!(matches!(summary.outcome_of(3), Some(RuleOutcome::Triggered { .. })));
}

#[tokio::test]
async fn test_label_filter_applies_before_aggregation() {
    let backend = FixtureBackend::new()
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Complete));
    let mut blog_only = pages_rule(1);
    blog_only.metric_condition = MetricCondition::GreaterThan;
    blog_only.metric_matched = Threshold(5.0);
    blog_only.report_condition = Some(FilterCondition::StartsWith);
    blog_only.report_matched = Some("/BLOG".into());
    let mut all_pages = blog_only.clone();
    all_pages.id = 2;
    all_pages.report_condition = Some(FilterCondition::MatchesAny);

    let h = Harness::new(vec![blog_only, all_pages], backend);
    let summary = h.processor.run_alerts(&ctx(0)).await.unwrap();

    assert_eq!(summary.outcome_of(1), Some(&RuleOutcome::NotTriggered));
    assert_eq!(
        summary.outcome_of(2),
        Some(&RuleOutcome::Triggered {
            value_new: 15.0,
            value_old: None
        })
    );
}

#[tokio::test]
async fn test_scheduler_drives_run_through_task_tracker() {
    let backend = FixtureBackend::new()
        .with_table(PAGES, 1, PeriodKind::Day, date(2024, 5, 9), pages_table(ArchiveState::Incomplete));
    let h = Harness::new(vec![pages_rule(1)], backend);
    let tracker = TaskTracker::new(3);
    let task = "custom_alerts.run_day_1";

    let first = tracker.starting(task, &StaticRetryTimetable::new()).unwrap();
    assert!(h.processor.run_alerts(&first).await.is_err());
    tracker.ending(task);

    let retry = tracker
        .starting(task, &StaticRetryTimetable::new().with_count(task, 3))
        .unwrap();
    assert!(retry.is_final_retry());
    assert!(h.processor.run_alerts(&retry).await.is_err());
    assert_eq!(h.checkpoint(1).await, None);
    tracker.ending(task);
}
