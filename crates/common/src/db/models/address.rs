//! Invoice billing/shipping address rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;

/// The two address slots an invoice payload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Billing,
    Shipping,
}

impl AddressKind {
    pub const ALL: [AddressKind; 2] = [AddressKind::Billing, AddressKind::Shipping];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Billing => "billing",
            AddressKind::Shipping => "shipping",
        }
    }

    /// JSON key in the invoice payload holding this address object.
    pub fn payload_field(&self) -> &'static str {
        match self {
            AddressKind::Billing => "billing_address",
            AddressKind::Shipping => "shipping_address",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per (invoice_id, kind). Owned by its invoice and replaced as a
/// pair from the invoice's authoritative payload; cascades on invoice delete.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceAddress {
    pub invoice_id: String,
    pub kind: String,
    pub attention: Option<String>,
    pub address: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub raw_json: Value,
}
