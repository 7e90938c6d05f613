//! Line-by-line parsing of export files into raw store rows.
//!
//! Parsing is best-effort by design: a line that is not valid JSON, or not
//! a JSON object, is logged with its source and offset and skipped without
//! aborting the file. A payload missing its entity id is still ingested
//! (null entity_id, retained for audit). Timestamp extraction never blocks
//! insertion; a field that fails to parse simply stays null.

use billflow_common::db::models::{NewRawRecord, RecordKind};
use billflow_common::time::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// Parse one line of an export file.
///
/// `line_no` is 1-based and counts every line of the file, including ones
/// this function rejects, so (source_file, line_no) stays stable across
/// re-runs of the same file.
pub fn parse_line(
    source_file: &str,
    line_no: i64,
    kind: RecordKind,
    line: &str,
) -> Option<NewRawRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let payload: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!(source = source_file, line = line_no, error = %e, "Invalid JSON line, skipping");
            return None;
        }
    };

    if !payload.is_object() {
        warn!(source = source_file, line = line_no, "Non-object payload, skipping");
        return None;
    }

    let entity_id = extract_id(&payload, kind.entity_id_field());
    if entity_id.is_none() {
        warn!(
            source = source_file,
            line = line_no,
            field = kind.entity_id_field(),
            "Payload missing entity id, ingesting for audit only"
        );
    }

    let created_time = extract_timestamp(&payload, "created_time");
    let updated_time = extract_timestamp(&payload, "updated_time");
    let last_modified_time = extract_timestamp(&payload, "last_modified_time");

    Some(NewRawRecord {
        source_file: source_file.to_string(),
        line_no,
        record_kind: kind,
        entity_id,
        raw_json: payload,
        created_time,
        updated_time,
        last_modified_time,
    })
}

// Upstream ids are strings, but some exports emit them as bare numbers.
fn extract_id(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn extract_timestamp(payload: &Value, field: &str) -> Option<DateTime<Utc>> {
    payload.get(field).and_then(Value::as_str).and_then(parse_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_invoice_line() {
        let line = r#"{"invoice_id": "INV-1", "total": "100.00", "last_modified_time": "2026-01-01T00:00:00Z"}"#;
        let rec = parse_line("invoices.jsonl", 1, RecordKind::Invoice, line).unwrap();

        assert_eq!(rec.entity_id.as_deref(), Some("INV-1"));
        assert_eq!(rec.line_no, 1);
        assert_eq!(rec.record_kind, RecordKind::Invoice);
        assert_eq!(
            rec.last_modified_time,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(rec.created_time, None);
    }

    #[test]
    fn test_customer_kind_uses_customer_id() {
        let line = r#"{"customer_id": "CUS-9", "invoice_id": "ignored"}"#;
        let rec = parse_line("customers.jsonl", 3, RecordKind::Customer, line).unwrap();
        assert_eq!(rec.entity_id.as_deref(), Some("CUS-9"));
    }

    #[test]
    fn test_numeric_id_is_coerced() {
        let line = r#"{"invoice_id": 982000000567, "status": "paid"}"#;
        let rec = parse_line("invoices.jsonl", 1, RecordKind::Invoice, line).unwrap();
        assert_eq!(rec.entity_id.as_deref(), Some("982000000567"));
    }

    #[test]
    fn test_blank_and_invalid_lines_skipped() {
        assert!(parse_line("f", 1, RecordKind::Invoice, "   ").is_none());
        assert!(parse_line("f", 2, RecordKind::Invoice, "{not json").is_none());
        assert!(parse_line("f", 3, RecordKind::Invoice, "[1, 2, 3]").is_none());
    }

    #[test]
    fn test_missing_id_kept_with_null_entity() {
        let rec = parse_line("f", 4, RecordKind::Invoice, r#"{"status": "draft"}"#).unwrap();
        assert_eq!(rec.entity_id, None);
    }

    #[test]
    fn test_unparseable_timestamp_left_null() {
        let line = r#"{"invoice_id": "INV-2", "updated_time": "yesterday-ish"}"#;
        let rec = parse_line("f", 5, RecordKind::Invoice, line).unwrap();
        assert_eq!(rec.updated_time, None);
    }
}
