//! Engine Configuration
//!
//! Configuration is plain data: construct it in code or deserialize it from
//! JSON. Every field has a default, so `{}` is a valid configuration.
//!
//! ```rust
//! use tether_core::config::{EngineConfig, NotifyPolicy};
//!
//! let config = EngineConfig::from_json_str(r#"{ "clock": { "step": 0.02 } }"#).unwrap();
//! assert_eq!(config.clock.step, 0.02);
//! assert_eq!(config.slots.notify, NotifyPolicy::OnChange);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults for slots created by the engine.
    pub slots: SlotConfig,
    pub clock: ClockConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.clock.validate()
    }
}

/// When a write notifies dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Only when the new value differs from the cached one.
    #[default]
    OnChange,
    /// On every write.
    Always,
}

/// Per-slot configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub notify: NotifyPolicy,
}

/// Clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Time of frame zero, in seconds.
    pub start: f64,
    /// Seconds per frame.
    pub step: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            step: 1.0 / 24.0,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.start.is_finite() {
            return Err(SlotError::Config(format!("clock start {} is not finite", self.start)));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(SlotError::Config(format!(
                "clock step must be positive, got {}",
                self.step
            )));
        }
        Ok(())
    }
}
