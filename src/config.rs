//! Runtime configuration
//!
//! Loaded from YAML through [`crate::parser::parse_config_file`]. Every
//! setting has a default, so an empty document is a valid configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::compiler::CompileOptions;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub compiler: CompileOptions,
    pub engine: EngineConfig,
}

/// Task registry and holder settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the idle-task reaper
    pub reaper_interval_ms: u64,
    /// Idle time after which a task with no fetch in progress is reclaimed
    pub idle_timeout_ms: u64,
    /// Rows per batch when the caller does not specify one
    pub default_fetch_size: usize,
    /// Fetch wait when the caller does not specify one
    pub default_fetch_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reaper_interval_ms: 10_000,
            idle_timeout_ms: 60_000,
            default_fetch_size: 1_000,
            default_fetch_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn reaper_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_millis(self.reaper_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn default_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.default_fetch_timeout_ms)
    }
}
