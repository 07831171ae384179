//! Storage collaborators: alert rules, triggered alerts and the key/value
//! medium retry checkpoints live in.

pub mod file;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use vigil_shared::types::rule::{AlertRule, PeriodKind, RuleId, SiteId};
use vigil_shared::types::trigger::TriggeredAlert;

/// Alert rule persistence. Rules are returned ordered by id.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn all_rules(&self) -> Result<Vec<AlertRule>>;

    async fn rules_for_period(&self, period: PeriodKind) -> Result<Vec<AlertRule>>;

    /// Rules applying to at least one of `site_ids`.
    async fn rules_for_sites(&self, site_ids: &[SiteId]) -> Result<Vec<AlertRule>>;

    /// Returns false if no such rule exists.
    async fn delete_rule(&self, id: RuleId) -> Result<bool>;

    /// Replace only the site set of a rule. Returns false if no such rule exists.
    async fn set_site_ids(&self, id: RuleId, site_ids: &[SiteId]) -> Result<bool>;

    /// Replace only the phone numbers of a rule. Returns false if no such rule exists.
    async fn set_phone_numbers(&self, id: RuleId, phone_numbers: &[String]) -> Result<bool>;

    async fn record_trigger(&self, alert: TriggeredAlert) -> Result<()>;

    async fn triggered_alerts(&self, rule_id: RuleId, site_id: SiteId) -> Result<Vec<TriggeredAlert>>;

    /// Returns the number of records removed.
    async fn delete_triggered_alerts_for_site(&self, site_id: SiteId) -> Result<usize>;
}

/// Durable string key/value medium.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
