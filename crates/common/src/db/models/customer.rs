//! Normalized customer projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One current row per customer_id. Written both from the customer export
/// stream and from customer fields embedded in invoice payloads, which is
/// why its upsert is guarded by `updated_at` rather than unconditional.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub raw_json: Value,
    pub updated_at: Option<DateTime<Utc>>,
}
