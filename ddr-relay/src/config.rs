//! Relay tuning loaded from an optional YAML file.
//!
//! ```yaml
//! lanes: 4
//! hit_window: 0.15
//! window_edge: exclusive
//! send_timeout_ms: 1000
//! subscriber_buffer: 32
//! ```

use anyhow::{bail, Context, Result};
use ddr_common::core::JudgeConfig;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub judge: JudgeConfig,
    /// Upper bound on a single WebSocket write
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per connection before pose updates are dropped
    pub subscriber_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            send_timeout_ms: 1000,
            subscriber_buffer: 32,
        }
    }
}

impl RelayConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {path:?}"))?;
                Self::from_yaml(&source).with_context(|| format!("invalid config {path:?}"))?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source).context("failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.judge.lanes == 0 {
            bail!("lanes must be at least 1");
        }
        if !(self.judge.hit_window.is_finite() && self.judge.hit_window > 0.0) {
            bail!("hit_window must be a positive number of seconds");
        }
        if self.send_timeout_ms == 0 {
            bail!("send_timeout_ms must be positive");
        }
        if self.subscriber_buffer == 0 {
            bail!("subscriber_buffer must be positive");
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
