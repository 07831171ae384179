//! Retry checkpoints.
//!
//! Per (period, site) run, the ids of rules already handled in the current
//! retry sequence. Stored as a JSON array in a [`KeyValueStore`].

use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;
use vigil_shared::types::rule::{PeriodKind, RuleId, SiteId};

const KEY_PREFIX: &str = "alerts_scheduled_task_retry";

pub struct CheckpointStore {
    medium: Arc<dyn KeyValueStore>,
}

impl CheckpointStore {
    pub fn new(medium: Arc<dyn KeyValueStore>) -> Self {
        Self { medium }
    }

    pub fn key(period: PeriodKind, site_id: SiteId) -> String {
        format!("{}_{}_{}", KEY_PREFIX, period, site_id)
    }

    /// Rule ids recorded for the run. Absent, unreadable or malformed
    /// values all read as an empty list.
    pub async fn load(&self, period: PeriodKind, site_id: SiteId) -> Vec<RuleId> {
        let key = Self::key(period, site_id);
        let raw = match self.medium.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(%key, error = %e, "Failed to read retry checkpoint, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<RuleId>>(&raw) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%key, error = %e, "Malformed retry checkpoint, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, period: PeriodKind, site_id: SiteId, rule_ids: &[RuleId]) -> Result<()> {
        let key = Self::key(period, site_id);
        let value = serde_json::to_string(rule_ids).context("Failed to encode checkpoint")?;
        self.medium
            .set(&key, &value)
            .await
            .with_context(|| format!("Failed to save checkpoint {}", key))
    }

    pub async fn clear(&self, period: PeriodKind, site_id: SiteId) -> Result<()> {
        let key = Self::key(period, site_id);
        self.medium
            .delete(&key)
            .await
            .with_context(|| format!("Failed to clear checkpoint {}", key))
    }
}
