//! WebSocket connection configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound frames buffered per connection
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Inbound control frames allowed per user per window
    #[serde(default = "default_messages_per_window")]
    pub messages_per_window: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often expired rate-limit windows are dropped
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl WebSocketConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_capacity == 0 {
            return Err(ValidationError::MustBePositive {
                field: "channel_capacity",
            });
        }
        if self.messages_per_window == 0 {
            return Err(ValidationError::MustBePositive {
                field: "messages_per_window",
            });
        }
        if self.window_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "window_secs",
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "sweep_interval_secs",
            });
        }
        Ok(())
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            messages_per_window: default_messages_per_window(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

fn default_messages_per_window() -> u32 {
    120
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}
