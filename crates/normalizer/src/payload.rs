//! Typed payload representations, validated once at parse time.
//!
//! The raw store holds payloads verbatim; this module is the single place
//! where a payload is turned into typed fields for the normalized tables.
//! Parse policy:
//! - Monetary fields: absent or null is `None`; present but unparsable as
//!   a number rejects the whole record (skipped and reported).
//! - Dates and timestamps: best-effort, unparsable values become `None`.
//! - Unknown fields are ignored; the verbatim payload is stored alongside
//!   the derived columns anyway.

use billflow_common::db::models::{AddressKind, Customer, Invoice, InvoiceAddress, RawRecord};
use billflow_common::time::parse_date;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Invoice export payload. Customer contact fields ride along on invoice
/// records, which is where the embedded customer upsert comes from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePayload {
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "de_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_date")]
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub current_sub_status: Option<String>,
    #[serde(default, deserialize_with = "de_decimal")]
    pub total: Option<Decimal>,
    #[serde(default, deserialize_with = "de_decimal")]
    pub balance: Option<Decimal>,
    pub currency_code: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub invoice_url: Option<String>,
    pub salesperson_id: Option<String>,
    pub salesperson_name: Option<String>,
    #[serde(default, deserialize_with = "de_address")]
    pub billing_address: Option<AddressPayload>,
    #[serde(default, deserialize_with = "de_address")]
    pub shipping_address: Option<AddressPayload>,
}

/// Customer export payload (the customer stream's own records).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPayload {
    pub customer_name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressPayload {
    pub attention: Option<String>,
    pub address: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub zipcode: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub zip: Option<String>,
    pub country: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub phone: Option<String>,
}

impl InvoicePayload {
    pub fn parse(record: &RawRecord) -> Result<Self, String> {
        serde_json::from_value(record.raw_json.clone()).map_err(|e| e.to_string())
    }

    /// Build the invoice row from this payload and its raw record.
    pub fn invoice_row(&self, invoice_id: &str, record: &RawRecord) -> Invoice {
        Invoice {
            invoice_id: invoice_id.to_string(),
            invoice_number: self.invoice_number.clone(),
            date: self.date,
            due_date: self.due_date,
            status: self.status.clone(),
            current_sub_status: self.current_sub_status.clone(),
            total: self.total,
            balance: self.balance,
            currency_code: self.currency_code.clone(),
            customer_id: self.customer_id.clone(),
            customer_name: self.customer_name.clone(),
            invoice_url: normalize_url(self.invoice_url.as_deref()),
            salesperson_id: self.salesperson_id.clone(),
            salesperson_name: self.salesperson_name.clone(),
            created_time: record.created_time,
            updated_time: record.updated_time,
            last_modified_time: record.last_modified_time,
            raw_json: record.raw_json.clone(),
        }
    }

    /// Both address rows derived from this payload. Kinds the payload does
    /// not carry yield no row.
    pub fn address_rows(&self, invoice_id: &str, record: &RawRecord) -> Vec<InvoiceAddress> {
        let mut rows = Vec::with_capacity(2);
        for kind in AddressKind::ALL {
            let payload = match kind {
                AddressKind::Billing => self.billing_address.as_ref(),
                AddressKind::Shipping => self.shipping_address.as_ref(),
            };
            let Some(addr) = payload else { continue };

            // Store the verbatim address object, not a re-serialization
            let raw = record
                .raw_json
                .get(kind.payload_field())
                .cloned()
                .unwrap_or(Value::Null);

            rows.push(InvoiceAddress {
                invoice_id: invoice_id.to_string(),
                kind: kind.as_str().to_string(),
                attention: addr.attention.clone(),
                address: addr.address.clone(),
                street2: addr.street2.clone(),
                city: addr.city.clone(),
                state: addr.state.clone(),
                zipcode: addr.zipcode.clone().or_else(|| addr.zip.clone()),
                country: addr.country.clone(),
                phone: addr.phone.clone(),
                raw_json: raw,
            });
        }
        rows
    }

    /// Customer row embedded in an invoice payload, if it names a customer.
    pub fn embedded_customer(&self, record: &RawRecord) -> Option<Customer> {
        let customer_id = self.customer_id.as_deref()?.trim();
        if customer_id.is_empty() {
            return None;
        }
        Some(Customer {
            customer_id: customer_id.to_string(),
            customer_name: self.customer_name.clone(),
            company_name: self.company_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            raw_json: record.raw_json.clone(),
            updated_at: record.updated_timestamp(),
        })
    }
}

impl CustomerPayload {
    pub fn parse(record: &RawRecord) -> Result<Self, String> {
        serde_json::from_value(record.raw_json.clone()).map_err(|e| e.to_string())
    }

    pub fn customer_row(&self, customer_id: &str, record: &RawRecord) -> Customer {
        Customer {
            customer_id: customer_id.to_string(),
            customer_name: self.customer_name.clone(),
            company_name: self.company_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            raw_json: record.raw_json.clone(),
            updated_at: record.updated_timestamp(),
        }
    }
}

fn normalize_url(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Absent/null -> None; number or numeric string -> exact decimal;
/// anything else present is a hard parse error.
pub fn decimal_from_value(value: &Value) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|e| format!("invalid numeric value {}: {}", n, e)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| format!("invalid numeric value {:?}", s)),
        other => Err(format!("expected number, got {}", other)),
    }
}

fn de_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal_from_value(&value).map_err(serde::de::Error::custom)
}

fn de_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(parse_date))
}

// Address objects are sometimes empty strings in upstream exports
fn de_address<'de, D>(deserializer: D) -> Result<Option<AddressPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_object() {
        serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}

// Zip codes and phone numbers occasionally arrive as bare numbers
fn de_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(payload: Value) -> RawRecord {
        RawRecord {
            source_file: "invoices.jsonl".into(),
            line_no: 1,
            record_kind: "invoice".into(),
            entity_id: Some("INV-1".into()),
            raw_json: payload,
            created_time: None,
            updated_time: None,
            last_modified_time: Some(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()),
            ingested_at: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_decimal_policy() {
        assert_eq!(decimal_from_value(&json!(null)).unwrap(), None);
        assert_eq!(
            decimal_from_value(&json!("150.00")).unwrap(),
            Some(Decimal::from_str("150.00").unwrap())
        );
        assert_eq!(
            decimal_from_value(&json!(99.5)).unwrap(),
            Some(Decimal::from_str("99.5").unwrap())
        );
        assert_eq!(decimal_from_value(&json!("")).unwrap(), None);
        assert!(decimal_from_value(&json!("abc")).is_err());
        assert!(decimal_from_value(&json!({"amount": 1})).is_err());
    }

    #[test]
    fn test_malformed_total_rejects_record() {
        let rec = record(json!({"invoice_id": "INV-2", "total": "abc"}));
        assert!(InvoicePayload::parse(&rec).is_err());
    }

    #[test]
    fn test_invoice_row_fields() {
        let rec = record(json!({
            "invoice_id": "INV-1",
            "invoice_number": "0042",
            "date": "2026-01-15",
            "due_date": "not-a-date",
            "status": "sent",
            "total": "150.00",
            "balance": 25,
            "currency_code": "USD",
            "customer_id": "CUS-7",
            "invoice_url": "  https://example.test/inv/42  "
        }));
        let payload = InvoicePayload::parse(&rec).unwrap();
        let invoice = payload.invoice_row("INV-1", &rec);

        assert_eq!(invoice.invoice_number.as_deref(), Some("0042"));
        assert_eq!(invoice.date, NaiveDate::from_ymd_opt(2026, 1, 15));
        assert_eq!(invoice.due_date, None);
        assert_eq!(invoice.total, Some(Decimal::from_str("150.00").unwrap()));
        assert_eq!(invoice.balance, Some(Decimal::from(25)));
        assert_eq!(invoice.invoice_url.as_deref(), Some("https://example.test/inv/42"));
        assert_eq!(invoice.last_modified_time, rec.last_modified_time);
        assert_eq!(invoice.raw_json, rec.raw_json);
    }

    #[test]
    fn test_address_rows_from_same_payload() {
        let rec = record(json!({
            "invoice_id": "INV-1",
            "billing_address": {
                "attention": "Accounts",
                "address": "1 Main St",
                "city": "Springfield",
                "zip": 12345
            },
            "shipping_address": {
                "address": "2 Dock Rd",
                "zipcode": "67890"
            }
        }));
        let payload = InvoicePayload::parse(&rec).unwrap();
        let rows = payload.address_rows("INV-1", &rec);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "billing");
        assert_eq!(rows[0].zipcode.as_deref(), Some("12345"));
        assert_eq!(rows[0].raw_json, rec.raw_json["billing_address"]);
        assert_eq!(rows[1].kind, "shipping");
        assert_eq!(rows[1].zipcode.as_deref(), Some("67890"));
    }

    #[test]
    fn test_address_kind_absent_or_blank() {
        let rec = record(json!({
            "invoice_id": "INV-1",
            "billing_address": "",
            "shipping_address": {"city": "Springfield"}
        }));
        let payload = InvoicePayload::parse(&rec).unwrap();
        let rows = payload.address_rows("INV-1", &rec);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "shipping");
    }

    #[test]
    fn test_embedded_customer() {
        let rec = record(json!({
            "invoice_id": "INV-1",
            "customer_id": "CUS-7",
            "customer_name": "Acme Co",
            "email": "billing@acme.test"
        }));
        let payload = InvoicePayload::parse(&rec).unwrap();
        let customer = payload.embedded_customer(&rec).unwrap();

        assert_eq!(customer.customer_id, "CUS-7");
        assert_eq!(customer.customer_name.as_deref(), Some("Acme Co"));
        assert_eq!(customer.updated_at, rec.last_modified_time);

        // updated_time outranks last_modified_time for the guard value
        let mut both = record(json!({"invoice_id": "INV-1", "customer_id": "CUS-7"}));
        both.updated_time = Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        let payload = InvoicePayload::parse(&both).unwrap();
        let customer = payload.embedded_customer(&both).unwrap();
        assert_eq!(customer.updated_at, both.updated_time);

        let no_customer = record(json!({"invoice_id": "INV-1"}));
        let payload = InvoicePayload::parse(&no_customer).unwrap();
        assert!(payload.embedded_customer(&no_customer).is_none());
    }
}
