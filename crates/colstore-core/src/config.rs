//! Table properties and index maintenance options.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::index::IndexEntry;
use crate::types::{LocalTime, MAX_TTL};

/// Default tombstone grace period (ten days).
pub const DEFAULT_GC_GRACE_SECONDS: u32 = 864_000;

/// Tunable properties of a table that do not affect its physical layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TableProperties {
    pub comment: String,
    /// Seconds; 0 disables the default expiry.
    pub default_time_to_live: u32,
    pub gc_grace_seconds: u32,
}

impl Default for TableProperties {
    fn default() -> Self {
        Self {
            comment: String::new(),
            default_time_to_live: 0,
            gc_grace_seconds: DEFAULT_GC_GRACE_SECONDS,
        }
    }
}

impl TableProperties {
    /// Check each property's range.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.default_time_to_live > MAX_TTL {
            return Err(SchemaError::InvalidProperty {
                name: "default_time_to_live".to_string(),
                reason: format!(
                    "must be at most {MAX_TTL} seconds, got {}",
                    self.default_time_to_live
                ),
            });
        }
        Ok(())
    }
}

/// Source of wall-clock seconds, used for local deletion times and liveness.
pub type Clock = Arc<dyn Fn() -> LocalTime + Send + Sync>;

/// Decides whether `update` removes the old index entry, given the old and
/// the new entry.
pub type CleanupPolicy = Arc<dyn Fn(&IndexEntry, &IndexEntry) -> bool + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as LocalTime)
            .unwrap_or(0)
    })
}

/// A fixed clock, for tests and replays.
pub fn fixed_clock(now: LocalTime) -> Clock {
    Arc::new(move || now)
}

/// Removes the old entry unless it is the very entry just written.
pub fn cleanup_when_changed() -> CleanupPolicy {
    Arc::new(|old: &IndexEntry, new: &IndexEntry| old != new)
}

/// Options for a secondary index maintainer.
#[derive(Clone)]
pub struct MaintainerOptions {
    pub clock: Clock,
    pub cleanup: CleanupPolicy,
}

impl Default for MaintainerOptions {
    fn default() -> Self {
        Self {
            clock: system_clock(),
            cleanup: cleanup_when_changed(),
        }
    }
}

impl MaintainerOptions {
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn now(&self) -> LocalTime {
        (self.clock)()
    }
}

impl fmt::Debug for MaintainerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintainerOptions")
            .field("now", &self.now())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let props = TableProperties::default();
        assert_eq!(props.gc_grace_seconds, DEFAULT_GC_GRACE_SECONDS);
        assert_eq!(props.default_time_to_live, 0);
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let props: TableProperties =
            serde_json::from_str(r#"{"default_time_to_live": 60}"#).unwrap();
        assert_eq!(props.default_time_to_live, 60);
        assert_eq!(props.gc_grace_seconds, DEFAULT_GC_GRACE_SECONDS);
    }

    #[test]
    fn test_ttl_over_limit_rejected() {
        let props = TableProperties {
            default_time_to_live: MAX_TTL + 1,
            ..Default::default()
        };
        let err = props.validate().unwrap_err();
        assert!(err.to_string().contains("default_time_to_live"));
    }

    #[test]
    fn test_default_cleanup_skips_identical_entries() {
        let policy = cleanup_when_changed();
        let a = IndexEntry {
            partition_key: b"v1".to_vec(),
            cell_name: b"row".to_vec(),
        };
        let b = IndexEntry {
            partition_key: b"v2".to_vec(),
            cell_name: b"row".to_vec(),
        };
        assert!(!policy(&a, &a.clone()));
        assert!(policy(&a, &b));
    }

    #[test]
    fn test_fixed_clock() {
        let options = MaintainerOptions::default().with_clock(fixed_clock(42));
        assert_eq!(options.now(), 42);
    }
}
