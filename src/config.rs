//! Run configuration for the resolution pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;
use crate::resolver::Thresholds;

pub const DEFAULT_LOW_THRESHOLD: f64 = 15.0;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 30.0;
pub const DEFAULT_MAX_WORKERS: usize = 5;
/// Seconds between catalog (Spotify) calls
pub const DEFAULT_CATALOG_MIN_INTERVAL: f64 = 0.1;
/// Seconds between scraper (NTS) calls
pub const DEFAULT_SCRAPE_MIN_INTERVAL: f64 = 0.3;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Consecutive search failures that mean the catalog is down rather than one query failing
pub const DEFAULT_MAX_SEARCH_FAILURES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveConfig {
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub max_workers: usize,
    pub catalog_min_interval: f64,
    pub scrape_min_interval: f64,
    pub search_limit: usize,
    pub max_search_failures: usize,
    pub data_dir: PathBuf,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            max_workers: DEFAULT_MAX_WORKERS,
            catalog_min_interval: DEFAULT_CATALOG_MIN_INTERVAL,
            scrape_min_interval: DEFAULT_SCRAPE_MIN_INTERVAL,
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_search_failures: DEFAULT_MAX_SEARCH_FAILURES,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ResolveConfig {
    /// Check every tunable and return the config unchanged if it is usable.
    pub fn validate(self) -> Result<Self, ConfigError> {
        Thresholds::new(self.low_threshold, self.high_threshold)?;

        check_min("max_workers", self.max_workers as f64, 1.0)?;
        check_min("search_limit", self.search_limit as f64, 1.0)?;
        check_min("max_search_failures", self.max_search_failures as f64, 1.0)?;
        check_min("catalog_min_interval", self.catalog_min_interval, 0.0)?;
        check_min("scrape_min_interval", self.scrape_min_interval, 0.0)?;

        Ok(self)
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.low_threshold, self.high_threshold)
    }

    pub fn catalog_interval(&self) -> Duration {
        Duration::from_secs_f64(self.catalog_min_interval.max(0.0))
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scrape_min_interval.max(0.0))
    }
}

fn check_min(name: &'static str, value: f64, min: f64) -> Result<(), ConfigError> {
    // NaN fails the comparison and is rejected too
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { name, min, value })
    }
}
