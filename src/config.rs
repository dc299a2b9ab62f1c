//! Feed configuration.

use crate::error::{FeedError, Result};
use serde::Deserialize;

/// Configuration shared by the live feed and the paged viewer.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    /// Max events held by the live feed buffer.
    /// Default: 50
    pub live_capacity: usize,

    /// Rows per page in the paged viewer.
    /// Default: 10
    pub page_size: usize,

    /// Max undelivered pushes per subscription before the source drops it.
    /// Default: 1000
    pub subscription_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            live_capacity: 50,
            page_size: 10,
            subscription_buffer: 1000,
        }
    }
}

impl FeedConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FeedConfig = serde_json::from_str(json)
            .map_err(|e| FeedError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.live_capacity == 0 {
            return Err(FeedError::InvalidConfig("live_capacity must be > 0".into()));
        }
        if self.page_size == 0 {
            return Err(FeedError::InvalidConfig("page_size must be > 0".into()));
        }
        if self.subscription_buffer == 0 {
            return Err(FeedError::InvalidConfig(
                "subscription_buffer must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn with_live_capacity(mut self, capacity: usize) -> Self {
        self.live_capacity = capacity;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}
