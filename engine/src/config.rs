//! Engine configuration

use crate::clock::{utc_offset, SystemClock};
use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use vigil_shared::types::rule::SiteId;

/// Default number of retries the scheduler grants a failing run.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File holding retry checkpoints
    pub state_path: PathBuf,

    /// Retries after which a failing run is given up
    pub max_retries: u32,

    /// UTC offset for sites without their own entry
    pub default_utc_offset_minutes: i32,

    /// Per-site settings
    pub sites: Vec<SiteConfig>,

    /// Emit logs as JSON
    pub log_json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: SiteId,
    /// Fixed offset from UTC. Daylight saving time is not followed, so use
    /// the site's standard-time offset.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("vigil-state.json"),
            max_retries: MAX_RETRIES,
            default_utc_offset_minutes: 0,
            sites: Vec::new(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file if given, then apply `VIGIL_*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a variable lookup such as the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("VIGIL_STATE_PATH") {
            self.state_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("VIGIL_MAX_RETRIES") {
            self.max_retries = raw
                .parse()
                .with_context(|| format!("Invalid VIGIL_MAX_RETRIES: {}", raw))?;
        }
        if let Some(raw) = lookup("VIGIL_LOG_JSON") {
            self.log_json = matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }
        offset_from_minutes(self.default_utc_offset_minutes)?;

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.id) {
                anyhow::bail!("Site {} is configured more than once", site.id);
            }
            offset_from_minutes(site.utc_offset_minutes)
                .with_context(|| format!("Invalid offset for site {}", site.id))?;
        }
        Ok(())
    }

    /// Wall clock using the configured site offsets.
    pub fn clock(&self) -> Result<SystemClock> {
        let mut offsets = HashMap::new();
        for site in &self.sites {
            offsets.insert(site.id, offset_from_minutes(site.utc_offset_minutes)?);
        }
        Ok(SystemClock::new(
            offsets,
            offset_from_minutes(self.default_utc_offset_minutes)?,
        ))
    }
}

fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    if minutes == 0 {
        return Ok(utc_offset());
    }
    FixedOffset::east_opt(minutes * 60)
        .with_context(|| format!("UTC offset out of range: {} minutes", minutes))
}
