// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message type filtering for capture.
//!
//! Supports include/exclude sets of type tags.

use std::collections::BTreeSet;

/// Filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterMode {
    /// Keep only listed tags.
    Include,
    /// Keep everything except listed tags.
    Exclude,
}

/// Type tag filter.
#[derive(Debug, Clone)]
pub struct TagFilter {
    mode: FilterMode,
    tags: BTreeSet<u16>,
}

impl TagFilter {
    /// Create an include filter (only capture listed tags).
    pub fn include(tags: impl IntoIterator<Item = u16>) -> Self {
        Self {
            mode: FilterMode::Include,
            tags: tags.into_iter().collect(),
        }
    }

    /// Create an exclude filter (capture everything but listed tags).
    pub fn exclude(tags: impl IntoIterator<Item = u16>) -> Self {
        Self {
            mode: FilterMode::Exclude,
            tags: tags.into_iter().collect(),
        }
    }

    /// Filter that keeps every tag.
    pub fn all() -> Self {
        Self::exclude([])
    }

    /// Check if a tag passes the filter.
    pub fn matches(&self, tag: u16) -> bool {
        let listed = self.tags.contains(&tag);
        match self.mode {
            FilterMode::Include => listed,
            FilterMode::Exclude => !listed,
        }
    }

    /// Tags in this filter.
    pub fn tags(&self) -> &BTreeSet<u16> {
        &self.tags
    }

    /// Check if this is an include filter.
    pub fn is_include(&self) -> bool {
        self.mode == FilterMode::Include
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::all()
    }
}
