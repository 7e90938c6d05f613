//! Row models for the raw store and normalized tables

mod address;
mod customer;
mod invoice;
mod raw_record;

pub use address::{AddressKind, InvoiceAddress};
pub use customer::Customer;
pub use invoice::Invoice;
pub use raw_record::{AuthorityKey, NewRawRecord, RawRecord, RecordKind};
