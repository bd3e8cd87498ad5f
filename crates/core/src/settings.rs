//! Per-collection settings that affect read visibility and durability,
//! tunable independently of document content.

use std::fmt;
use std::time::Duration;

/// How often a collection's searchable view catches up with its writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    /// Only an explicit refresh makes writes searchable.
    Never,
    Every(Duration),
}

impl RefreshInterval {
    /// Elasticsearch `index.refresh_interval` value.
    pub fn to_es_string(&self) -> String {
        match self {
            RefreshInterval::Never => "-1".to_string(),
            RefreshInterval::Every(d) if d.subsec_millis() == 0 => format!("{}s", d.as_secs()),
            RefreshInterval::Every(d) => format!("{}ms", d.as_millis()),
        }
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshInterval::Never => f.write_str("never"),
            RefreshInterval::Every(_) => f.write_str(&self.to_es_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSettings {
    pub refresh_interval: RefreshInterval,
    pub replica_count: u32,
}

impl CollectionSettings {
    /// Settings a serving collection runs with: refresh every second, one replica.
    pub fn steady_state() -> Self {
        Self {
            refresh_interval: RefreshInterval::Every(Duration::from_secs(1)),
            replica_count: 1,
        }
    }

    /// Settings for a collection that is being bulk-loaded and not yet serving reads.
    pub fn bulk_load() -> Self {
        Self {
            refresh_interval: RefreshInterval::Never,
            replica_count: 0,
        }
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self::steady_state()
    }
}
