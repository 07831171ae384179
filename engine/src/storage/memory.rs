//! In-memory storage backends. Thread-safe.

use super::{KeyValueStore, RuleStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use vigil_shared::types::rule::{AlertRule, PeriodKind, RuleId, SiteId};
use vigil_shared::types::trigger::TriggeredAlert;

#[derive(Debug, Default)]
struct RuleStoreInner {
    rules: Vec<AlertRule>,
    triggered: Vec<TriggeredAlert>,
}

/// Rule store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    inner: RwLock<RuleStoreInner>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> anyhow::Error {
    anyhow!("rule store lock poisoned: {}", e)
}

impl InMemoryRuleStore {
    pub fn new(mut rules: Vec<AlertRule>) -> Self {
        rules.sort_by_key(|r| r.id);
        Self {
            inner: RwLock::new(RuleStoreInner {
                rules,
                triggered: Vec::new(),
            }),
        }
    }

    pub fn with_triggered(self, triggered: Vec<TriggeredAlert>) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.triggered = triggered;
        }
        self
    }

    /// Every triggered alert, oldest first.
    pub fn all_triggered(&self) -> Result<Vec<TriggeredAlert>> {
        Ok(self.inner.read().map_err(poisoned)?.triggered.clone())
    }

    fn update_rule<F>(&self, id: RuleId, update: F) -> Result<bool>
    where
        F: FnOnce(&mut AlertRule),
    {
        let mut inner = self.inner.write().map_err(poisoned)?;
        match inner.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                update(rule);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn all_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.inner.read().map_err(poisoned)?.rules.clone())
    }

    async fn rules_for_period(&self, period: PeriodKind) -> Result<Vec<AlertRule>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .rules
            .iter()
            .filter(|r| r.period == period)
            .cloned()
            .collect())
    }

    async fn rules_for_sites(&self, site_ids: &[SiteId]) -> Result<Vec<AlertRule>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .rules
            .iter()
            .filter(|r| r.id_sites.iter().any(|s| site_ids.contains(s)))
            .cloned()
            .collect())
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id != id);
        Ok(inner.rules.len() < before)
    }

    async fn set_site_ids(&self, id: RuleId, site_ids: &[SiteId]) -> Result<bool> {
        self.update_rule(id, |rule| rule.id_sites = site_ids.to_vec())
    }

    async fn set_phone_numbers(&self, id: RuleId, phone_numbers: &[String]) -> Result<bool> {
        self.update_rule(id, |rule| rule.phone_numbers = phone_numbers.to_vec())
    }

    async fn record_trigger(&self, alert: TriggeredAlert) -> Result<()> {
        self.inner.write().map_err(poisoned)?.triggered.push(alert);
        Ok(())
    }

    async fn triggered_alerts(&self, rule_id: RuleId, site_id: SiteId) -> Result<Vec<TriggeredAlert>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .triggered
            .iter()
            .filter(|t| t.rule_id == rule_id && t.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn delete_triggered_alerts_for_site(&self, site_id: SiteId) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.triggered.len();
        inner.triggered.retain(|t| t.site_id != site_id);
        Ok(before - inner.triggered.len())
    }
}

/// Key/value medium held in memory.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|e| anyhow!("{}", e))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| anyhow!("{}", e))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| anyhow!("{}", e))?;
        entries.remove(key);
        Ok(())
    }
}
