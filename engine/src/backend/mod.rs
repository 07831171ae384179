//! Reporting backend and report catalog collaborators

pub mod fixture;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use vigil_shared::types::report::{ReportMetadata, ReportTable};
use vigil_shared::types::rule::{PeriodKind, SiteId};

/// Request shape options. Alert evaluation always asks for a flat,
/// unfiltered, unpaginated table with the archive state attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub flat: bool,
    pub disable_queued_filters: bool,
    pub fetch_archive_state: bool,
    pub no_limit: bool,
}

impl QueryOptions {
    pub const FOR_ALERTS: QueryOptions = QueryOptions {
        flat: true,
        disable_queued_filters: true,
        fetch_archive_state: true,
        no_limit: true,
    };
}

/// One report query.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    /// `Module.action`
    pub method: String,
    pub site_id: SiteId,
    pub period: PeriodKind,
    pub date: NaiveDate,
    pub options: QueryOptions,
    /// Report-specific parameters from the catalog.
    pub parameters: BTreeMap<String, String>,
}

/// Source of computed report tables.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Fetch one table. Implementations enforce their own timeouts.
    async fn query(&self, query: &ReportQuery) -> Result<ReportTable>;
}

/// Report metadata lookup by unique id (e.g. `Actions_getPageUrls`).
pub trait ReportCatalog: Send + Sync {
    fn report_metadata(&self, site_id: SiteId, unique_id: &str) -> Option<ReportMetadata>;
}
