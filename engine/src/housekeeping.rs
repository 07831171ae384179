//! Rule store maintenance when users, sites or phone numbers go away.
//!
//! Every change is a partial update of exactly one rule field.

use crate::storage::RuleStore;
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use vigil_shared::types::rule::{RuleId, SiteId};

pub struct Housekeeping {
    store: Arc<dyn RuleStore>,
}

impl Housekeeping {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Delete every rule owned by `login`. Returns the deleted ids.
    pub async fn user_deleted(&self, login: &str) -> Result<Vec<RuleId>> {
        let mut deleted = Vec::new();
        for rule in self.store.all_rules().await? {
            if rule.login == login && self.store.delete_rule(rule.id).await? {
                deleted.push(rule.id);
            }
        }
        info!(login, rules = deleted.len(), "Removed alerts of deleted user");
        Ok(deleted)
    }

    /// Drop the site's triggered alerts and remove it from every rule's
    /// site set. Returns the ids of rules that were updated.
    pub async fn site_deleted(&self, site_id: SiteId) -> Result<Vec<RuleId>> {
        let removed = self.store.delete_triggered_alerts_for_site(site_id).await?;

        let mut updated = Vec::new();
        for rule in self.store.rules_for_sites(&[site_id]).await? {
            let remaining: Vec<SiteId> = rule
                .id_sites
                .iter()
                .copied()
                .filter(|s| *s != site_id)
                .collect();
            if self.store.set_site_ids(rule.id, &remaining).await? {
                updated.push(rule.id);
            }
        }
        info!(site_id, triggered_removed = removed, rules = updated.len(), "Removed deleted site from alerts");
        Ok(updated)
    }

    /// Remove a phone number from every rule that notifies it.
    pub async fn phone_number_deleted(&self, phone_number: &str) -> Result<Vec<RuleId>> {
        let mut updated = Vec::new();
        for rule in self.store.all_rules().await? {
            if !rule.phone_numbers.iter().any(|p| p == phone_number) {
                continue;
            }
            let remaining: Vec<String> = rule
                .phone_numbers
                .into_iter()
                .filter(|p| p != phone_number)
                .collect();
            if self.store.set_phone_numbers(rule.id, &remaining).await? {
                updated.push(rule.id);
            }
        }
        Ok(updated)
    }

    /// Sites referenced by at least one rule, ascending.
    pub async fn site_ids_with_alerts(&self) -> Result<Vec<SiteId>> {
        let sites: BTreeSet<SiteId> = self
            .store
            .all_rules()
            .await?
            .iter()
            .flat_map(|r| r.id_sites.iter().copied())
            .collect();
        Ok(sites.into_iter().collect())
    }
}
