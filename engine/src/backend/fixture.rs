//! Fixture-backed reporting backend.
//!
//! Serves report tables and catalog entries from memory, typically loaded
//! from a JSON file. Queries without a stored table return an empty table
//! with no archive state, which is what a backend answers for a date with
//! no data.

use super::{ReportBackend, ReportCatalog, ReportQuery};
use crate::storage::memory::InMemoryRuleStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;
use vigil_shared::types::report::{ReportMetadata, ReportTable};
use vigil_shared::types::rule::{AlertRule, PeriodKind, SiteId};
use vigil_shared::types::trigger::TriggeredAlert;

type TableKey = (String, SiteId, PeriodKind, NaiveDate);

#[derive(Debug, Default)]
pub struct FixtureBackend {
    reports: HashMap<String, ReportMetadata>,
    tables: RwLock<HashMap<TableKey, ReportTable>>,
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(mut self, unique_id: &str, metadata: ReportMetadata) -> Self {
        self.reports.insert(unique_id.to_string(), metadata);
        self
    }

    pub fn with_table(
        self,
        method: &str,
        site_id: SiteId,
        period: PeriodKind,
        date: NaiveDate,
        table: ReportTable,
    ) -> Self {
        self.set_table(method, site_id, period, date, table);
        self
    }

    /// Insert or replace a table, e.g. once its archive finishes.
    pub fn set_table(
        &self,
        method: &str,
        site_id: SiteId,
        period: PeriodKind,
        date: NaiveDate,
        table: ReportTable,
    ) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert((method.to_string(), site_id, period, date), table);
        }
    }
}

#[async_trait]
impl ReportBackend for FixtureBackend {
    async fn query(&self, query: &ReportQuery) -> Result<ReportTable> {
        let tables = self
            .tables
            .read()
            .map_err(|e| anyhow::anyhow!("fixture tables lock poisoned: {}", e))?;
        let key = (query.method.clone(), query.site_id, query.period, query.date);
        Ok(tables.get(&key).cloned().unwrap_or_default())
    }
}

impl ReportCatalog for FixtureBackend {
    fn report_metadata(&self, _site_id: SiteId, unique_id: &str) -> Option<ReportMetadata> {
        self.reports.get(unique_id).cloned()
    }
}

/// One stored table in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFixture {
    pub method: String,
    pub site_id: SiteId,
    pub period: PeriodKind,
    pub date: NaiveDate,
    pub table: ReportTable,
}

/// On-disk fixture: rules, report catalog and report tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub triggered: Vec<TriggeredAlert>,
    #[serde(default)]
    pub reports: BTreeMap<String, ReportMetadata>,
    #[serde(default)]
    pub tables: Vec<TableFixture>,
}

impl FixtureFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fixture {}", path.display()))
    }

    /// Split into the rule store and the backend/catalog it describes.
    pub fn into_parts(self) -> (InMemoryRuleStore, FixtureBackend) {
        let store = InMemoryRuleStore::new(self.rules).with_triggered(self.triggered);
        let mut backend = FixtureBackend::new();
        for (unique_id, metadata) in self.reports {
            backend = backend.with_report(&unique_id, metadata);
        }
        for t in self.tables {
            backend.set_table(&t.method, t.site_id, t.period, t.date, t.table);
        }
        (store, backend)
    }
}
