//! Column family definitions for the RocksDB case store
//!
//! Each column family provides logical separation of data types
//! while sharing the same RocksDB instance.

/// Column family for cases
pub const CF_CASES: &str = "cases";

/// Column family for dispatcher override records
pub const CF_OVERRIDES: &str = "overrides";

/// Column family for the event journal
pub const CF_EVENTS: &str = "events";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_CASES, CF_OVERRIDES, CF_EVENTS];

/// Key prefixes for compound keys
pub mod keys {
    /// Create a case key
    pub fn case(case_id: &str) -> String {
        format!("case:{}", case_id)
    }

    /// Create an override key (one per case)
    pub fn case_override(case_id: &str) -> String {
        format!("ovr:{}", case_id)
    }

    /// Create an event key (timestamp-based for ordering)
    pub fn event(timestamp_nanos: i64, event_id: &str) -> String {
        format!("evt:{:020}:{}", timestamp_nanos, event_id)
    }

    /// Parse event timestamp from key
    pub fn parse_event_timestamp(key: &str) -> Option<i64> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() >= 2 && parts[0] == "evt" {
            parts[1].parse().ok()
        } else {
            None
        }
    }
}
