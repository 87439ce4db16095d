use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration compiled into the wasm bundle
const EMBEDDED_CONFIG: &str = include_str!("../guard.toml");

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GuardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub page_guard: PageGuardConfig,
    #[serde(default)]
    pub panel: PanelConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "error", "warn", "info", "debug" or "trace"
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MessagingConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
}

impl MessagingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.probe_attempts, Duration::from_millis(self.probe_delay_ms))
    }
}

/// Which side wins when a page receives a toggle broadcast
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyModel {
    /// Apply the broadcast payload as-is
    #[default]
    Message,
    /// Re-read the store and apply the persisted flag
    Store,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PageGuardConfig {
    #[serde(default = "default_log_sample_rate")]
    pub log_sample_rate: f64,
    #[serde(default)]
    pub consistency: ConsistencyModel,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PanelConfig {
    #[serde(default = "default_notice_ms")]
    pub notice_ms: u64,
    #[serde(default = "default_fallback_version")]
    pub fallback_version: String,
}

impl PanelConfig {
    pub fn notice_lifetime(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_delay_ms() -> u64 {
    200
}

fn default_log_sample_rate() -> f64 {
    0.1
}

fn default_notice_ms() -> u64 {
    3000
}

fn default_fallback_version() -> String {
    "1.0.0".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            probe_attempts: default_probe_attempts(),
            probe_delay_ms: default_probe_delay_ms(),
        }
    }
}

impl Default for PageGuardConfig {
    fn default() -> Self {
        Self {
            log_sample_rate: default_log_sample_rate(),
            consistency: ConsistencyModel::default(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            notice_ms: default_notice_ms(),
            fallback_version: default_fallback_version(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            messaging: MessagingConfig::default(),
            page_guard: PageGuardConfig::default(),
            panel: PanelConfig::default(),
        }
    }
}

impl GuardConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: GuardConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration bundled with the extension, falling back to
    /// defaults when it is broken
    pub fn embedded() -> Self {
        match Self::parse(EMBEDDED_CONFIG) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Invalid embedded config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.log_level()?;

        let rate = self.page_guard.log_sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("page_guard.log_sample_rate must be within 0..=1, got {}", rate);
        }
        if self.messaging.timeout_ms == 0 {
            anyhow::bail!("messaging.timeout_ms must be positive");
        }
        if self.messaging.probe_attempts == 0 {
            anyhow::bail!("messaging.probe_attempts must be at least 1");
        }
        if self.panel.fallback_version.trim().is_empty() {
            anyhow::bail!("panel.fallback_version must not be empty");
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<log::Level> {
        self.logging
            .level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", self.logging.level))
    }
}
