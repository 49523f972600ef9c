//! Engine configuration.
//!
//! Supplied once at startup. All durations are plain milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::offset::{OffsetMode, RelativeReset};

/// Timing parameters of the engine and its tick loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A clock jump larger than this forces a full recompute.
    pub skip_limit: i64,
    /// Interval between timer recomputations.
    pub update_rate: u64,
    /// Interval between notifications to observers and automations.
    pub notification_rate: u64,
    /// How early the finish transition may fire.
    pub trigger_ahead: i64,
    /// Initial duration of the aux timer.
    pub aux_timer_default: i64,
    pub offset_mode: OffsetMode,
    pub relative_reset: RelativeReset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            skip_limit: 1000,
            update_rate: 32,
            notification_rate: 1000,
            trigger_ahead: 10,
            aux_timer_default: 300_000,
            offset_mode: OffsetMode::Absolute,
            relative_reset: RelativeReset::Rundown,
        }
    }
}

impl EngineConfig {
    /// Check ranges and the ordering of the two rates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_rate == 0 {
            return Err(ConfigError::NotPositive {
                field: "update_rate",
            });
        }
        if self.skip_limit <= 0 {
            return Err(ConfigError::NotPositive {
                field: "skip_limit",
            });
        }
        if self.trigger_ahead < 0 {
            return Err(ConfigError::NotPositive {
                field: "trigger_ahead",
            });
        }
        if self.aux_timer_default < 0 {
            return Err(ConfigError::NotPositive {
                field: "aux_timer_default",
            });
        }
        if self.notification_rate < self.update_rate {
            return Err(ConfigError::RateOrder {
                update: self.update_rate,
                notification: self.notification_rate,
            });
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_rate)
    }

    pub fn notification_interval(&self) -> Duration {
        Duration::from_millis(self.notification_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.update_rate, 32);
        assert_eq!(config.notification_rate, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_order_rejected() {
        let config = EngineConfig {
            update_rate: 100,
            notification_rate: 50,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RateOrder {
                update: 100,
                notification: 50
            })
        );
    }

    #[test]
    fn test_zero_update_rate_rejected() {
        let config = EngineConfig {
            update_rate: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "update_rate" })
        ));
    }

    #[test]
    fn test_partial_deserialise() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"skip_limit":2000,"offset_mode":"relative"}"#).unwrap();
        assert_eq!(config.skip_limit, 2000);
        assert_eq!(config.offset_mode, OffsetMode::Relative);
        assert_eq!(config.trigger_ahead, 10);
    }
}
