//! Immutable raw store rows and the ordering that decides authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Which upstream export stream a raw record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Invoice,
    Customer,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Invoice => "invoice",
            RecordKind::Customer => "customer",
        }
    }

    /// JSON key holding the entity identifier for this kind.
    pub fn entity_id_field(&self) -> &'static str {
        match self {
            RecordKind::Invoice => "invoice_id",
            RecordKind::Customer => "customer_id",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(RecordKind::Invoice),
            "customer" => Ok(RecordKind::Customer),
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// A raw store row. Never updated or deleted after insertion; multiple rows
/// may share an entity_id (re-exports, re-ingests) and all are retained.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_file: String,
    pub line_no: i64,
    pub record_kind: String,
    pub entity_id: Option<String>,
    pub raw_json: Value,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

/// Last-write-wins ordering key.
///
/// Upstream payloads populate timestamp fields inconsistently across record
/// types, so each record is ranked by its single best available timestamp
/// (last_modified_time, else updated_time, else created_time), compared
/// across records; the latest wins. A record with no timestamp at all
/// orders below any that carries one, and fully-timestampless ties fall
/// back to raw insertion order (ingested_at, line_no).
pub type AuthorityKey = (Option<DateTime<Utc>>, DateTime<Utc>, i64);

impl RawRecord {
    pub fn authority_key(&self) -> AuthorityKey {
        (self.best_timestamp(), self.ingested_at, self.line_no)
    }

    /// Best available timestamp for this record, the value authority
    /// ordering compares across records.
    pub fn best_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_modified_time
            .or(self.updated_time)
            .or(self.created_time)
    }

    /// Update timestamp for customer rows derived from this record, used
    /// as the customers last-write-wins guard value. Note the order:
    /// updated_time outranks last_modified_time here.
    pub fn updated_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_time
            .or(self.last_modified_time)
            .or(self.created_time)
    }

    /// Stable identifier for logs and skip reports.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_file, self.line_no)
    }
}

/// A raw record about to be written by the loader.
#[derive(Debug, Clone)]
pub struct NewRawRecord {
    pub source_file: String,
    pub line_no: i64,
    pub record_kind: RecordKind,
    pub entity_id: Option<String>,
    pub raw_json: Value,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(
        line_no: i64,
        lmt: Option<DateTime<Utc>>,
        ut: Option<DateTime<Utc>>,
        ct: Option<DateTime<Utc>>,
    ) -> RawRecord {
        RawRecord {
            source_file: "a.jsonl".into(),
            line_no,
            record_kind: "invoice".into(),
            entity_id: Some("INV-1".into()),
            raw_json: serde_json::json!({}),
            created_time: ct,
            updated_time: ut,
            last_modified_time: lmt,
            ingested_at: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, line_no as u32).unwrap(),
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_last_modified_wins_regardless_of_insertion_order() {
        let older = record(2, Some(ts(1)), None, None);
        let newer = record(1, Some(ts(2)), None, None);
        assert!(newer.authority_key() > older.authority_key());
    }

    #[test]
    fn test_latest_available_timestamp_wins_across_fields() {
        // A stale last_modified_time loses to a fresher updated_time:
        // records are ranked by their best timestamp, not field by field
        let stale_lmt = record(1, Some(ts(1)), None, None);
        let fresh_updated = record(2, None, Some(ts(5)), None);
        assert!(fresh_updated.authority_key() > stale_lmt.authority_key());
    }

    #[test]
    fn test_fallback_to_updated_then_created() {
        let a = record(1, None, Some(ts(3)), None);
        let b = record(2, None, Some(ts(2)), Some(ts(9)));
        assert!(a.authority_key() > b.authority_key());

        let c = record(1, None, None, Some(ts(4)));
        let d = record(2, None, None, Some(ts(3)));
        assert!(c.authority_key() > d.authority_key());
    }

    #[test]
    fn test_any_timestamp_beats_none() {
        let with_created = record(1, None, None, Some(ts(1)));
        let without = record(2, None, None, None);
        assert!(with_created.authority_key() > without.authority_key());
    }

    #[test]
    fn test_customer_guard_prefers_updated_time() {
        let rec = record(1, Some(ts(2)), Some(ts(5)), Some(ts(1)));
        assert_eq!(rec.updated_timestamp(), Some(ts(5)));
        assert_eq!(rec.best_timestamp(), Some(ts(2)));

        let no_updated = record(1, Some(ts(2)), None, Some(ts(1)));
        assert_eq!(no_updated.updated_timestamp(), Some(ts(2)));
    }

    #[test]
    fn test_all_null_falls_back_to_insertion_order() {
        let earlier = record(1, None, None, None);
        let later = record(2, None, None, None);
        assert!(later.authority_key() > earlier.authority_key());
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!("invoice".parse::<RecordKind>().unwrap(), RecordKind::Invoice);
        assert_eq!(RecordKind::Customer.to_string(), "customer");
        assert!("paper".parse::<RecordKind>().is_err());
    }
}
