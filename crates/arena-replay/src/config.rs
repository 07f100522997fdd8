// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replay engine configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! recorded_tags = [0x0DD, 0x0EF, 0x131, 0x132, 0x1F3, 0x496]
//! max_messages_per_tick = 0
//!
//! [rewrite]
//! container_tags = [0x51E]
//! compressed_tags = [0x1F6, 0x2FB]
//! packed_only_tags = [0x0DD]
//! ```

use crate::filter::TagFilter;
use crate::ghost::DEFAULT_PROBE_LIMIT;
use crate::rewrite::RewriteProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Type tags captured during a match.
    #[serde(default = "default_recorded_tags")]
    pub recorded_tags: Vec<u16>,

    /// Per-tag rewrite strategies.
    #[serde(default = "default_rewrite")]
    pub rewrite: RewriteProfile,

    /// Messages handled per scheduler tick (0 = unlimited).
    #[serde(default)]
    pub max_messages_per_tick: usize,

    /// Linear probe budget of the ghost allocator.
    #[serde(default = "default_probe_limit")]
    pub ghost_probe_limit: u64,

    /// Entries in a recent-replays listing.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Entries in one page of bookmarks.
    #[serde(default = "default_bookmark_page")]
    pub bookmark_page: usize,
}

/// Movement, spell and aura traffic.
fn default_recorded_tags() -> Vec<u16> {
    vec![0x00DD, 0x00EF, 0x0131, 0x0132, 0x01F3, 0x0496]
}

fn default_rewrite() -> RewriteProfile {
    RewriteProfile::default()
        .container(0x051E)
        .compressed(0x01F6)
        .compressed(0x02FB)
        .packed_only(0x00DD)
}

fn default_probe_limit() -> u64 {
    DEFAULT_PROBE_LIMIT
}

fn default_recent_limit() -> usize {
    10
}

fn default_bookmark_page() -> usize {
    29
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            recorded_tags: default_recorded_tags(),
            rewrite: default_rewrite(),
            max_messages_per_tick: 0,
            ghost_probe_limit: default_probe_limit(),
            recent_limit: default_recent_limit(),
            bookmark_page: default_bookmark_page(),
        }
    }
}

impl ReplayConfig {
    /// Create a new config builder.
    pub fn builder() -> ReplayConfigBuilder {
        ReplayConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recorded_tags.is_empty() {
            return Err(ConfigError::Invalid("No recorded tags configured".into()));
        }

        if let Some(tag) = self
            .rewrite
            .container_tags
            .intersection(&self.rewrite.compressed_tags)
            .next()
        {
            return Err(ConfigError::Invalid(format!(
                "Tag {:#06x} is both a container and compressed",
                tag
            )));
        }

        if self.ghost_probe_limit == 0 {
            return Err(ConfigError::Invalid("ghost_probe_limit must be > 0".into()));
        }

        if self.recent_limit == 0 || self.bookmark_page == 0 {
            return Err(ConfigError::Invalid("Listing limits must be > 0".into()));
        }

        Ok(())
    }

    /// Capture filter built from `recorded_tags`.
    pub fn tag_filter(&self) -> TagFilter {
        TagFilter::include(self.recorded_tags.iter().copied())
    }
}

/// Config builder for fluent API.
#[derive(Debug, Default)]
pub struct ReplayConfigBuilder {
    recorded_tags: Option<Vec<u16>>,
    rewrite: Option<RewriteProfile>,
    max_messages_per_tick: Option<usize>,
    ghost_probe_limit: Option<u64>,
    recent_limit: Option<usize>,
    bookmark_page: Option<usize>,
}

impl ReplayConfigBuilder {
    /// Set captured tags.
    pub fn recorded_tags(mut self, tags: impl IntoIterator<Item = u16>) -> Self {
        self.recorded_tags = Some(tags.into_iter().collect());
        self
    }

    /// Set rewrite profile.
    pub fn rewrite(mut self, profile: RewriteProfile) -> Self {
        self.rewrite = Some(profile);
        self
    }

    /// Set per-tick cap (0 = unlimited).
    pub fn max_messages_per_tick(mut self, max: usize) -> Self {
        self.max_messages_per_tick = Some(max);
        self
    }

    pub fn ghost_probe_limit(mut self, limit: u64) -> Self {
        self.ghost_probe_limit = Some(limit);
        self
    }

    pub fn recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = Some(limit);
        self
    }

    pub fn bookmark_page(mut self, size: usize) -> Self {
        self.bookmark_page = Some(size);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ReplayConfig {
        let defaults = ReplayConfig::default();

        ReplayConfig {
            recorded_tags: self.recorded_tags.unwrap_or(defaults.recorded_tags),
            rewrite: self.rewrite.unwrap_or(defaults.rewrite),
            max_messages_per_tick: self
                .max_messages_per_tick
                .unwrap_or(defaults.max_messages_per_tick),
            ghost_probe_limit: self.ghost_probe_limit.unwrap_or(defaults.ghost_probe_limit),
            recent_limit: self.recent_limit.unwrap_or(defaults.recent_limit),
            bookmark_page: self.bookmark_page.unwrap_or(defaults.bookmark_page),
        }
    }
}
