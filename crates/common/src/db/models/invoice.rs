//! Normalized invoice projection.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One current row per invoice_id (upsert key).
///
/// `customer_id` is a soft reference: the customer row may not exist yet
/// when the invoice lands, and the reference resolves once it does.
/// Monetary fields are NUMERIC-backed decimals, never floats.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub current_sub_status: Option<String>,
    pub total: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub currency_code: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub invoice_url: Option<String>,
    pub salesperson_id: Option<String>,
    pub salesperson_name: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub raw_json: Value,
}
