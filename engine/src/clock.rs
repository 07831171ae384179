//! Timezone-aware clock

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use std::collections::HashMap;
use vigil_shared::types::rule::SiteId;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// UTC offset configured for a site.
    fn timezone(&self, site_id: SiteId) -> FixedOffset;

    /// Wall-clock time at the site.
    fn now_in_timezone(&self, site_id: SiteId) -> NaiveDateTime {
        self.now()
            .with_timezone(&self.timezone(site_id))
            .naive_local()
    }
}

/// Real clock with a per-site offset table.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offsets: HashMap<SiteId, FixedOffset>,
    default_offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offsets: HashMap<SiteId, FixedOffset>, default_offset: FixedOffset) -> Self {
        Self {
            offsets,
            default_offset,
        }
    }

    pub fn utc() -> Self {
        Self::new(HashMap::new(), utc_offset())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self, site_id: SiteId) -> FixedOffset {
        self.offsets
            .get(&site_id)
            .copied()
            .unwrap_or(self.default_offset)
    }
}

/// Clock frozen at a given instant. Used by tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Utc>,
    offsets: HashMap<SiteId, FixedOffset>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            offsets: HashMap::new(),
        }
    }

    pub fn with_site_offset(mut self, site_id: SiteId, offset: FixedOffset) -> Self {
        self.offsets.insert(site_id, offset);
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn timezone(&self, site_id: SiteId) -> FixedOffset {
        self.offsets.get(&site_id).copied().unwrap_or_else(utc_offset)
    }
}

/// Offset of zero seconds.
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}
