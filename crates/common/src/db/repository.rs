//! Repository for database operations
//!
//! All SQL for the pipeline lives here: append-only raw inserts and the
//! normalized upserts. Normalized writes take a caller-owned transaction so
//! the engine can make each entity's upsert all-or-nothing.

use crate::db::models::{Customer, Invoice, InvoiceAddress, NewRawRecord, RawRecord, RecordKind};
use crate::db::DbPool;
use crate::errors::Result;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

/// One independent unit of normalization work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityUnit {
    pub kind: RecordKind,
    pub entity_id: String,
}

impl EntityUnit {
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.entity_id)
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool: pool.inner().clone(),
        }
    }

    /// Begin a transaction for one entity's upsert.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // ========================================================================
    // Raw Store (append-only)
    // ========================================================================

    /// Insert one raw record. Re-ingesting the same (source_file, line_no)
    /// is a no-op; returns whether a row was actually written.
    pub async fn insert_raw_record(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        rec: &NewRawRecord,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO raw_records (
                source_file, line_no, record_kind, entity_id, raw_json,
                created_time, updated_time, last_modified_time, ingested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (source_file, line_no) DO NOTHING
            "#,
        )
        .bind(&rec.source_file)
        .bind(rec.line_no)
        .bind(rec.record_kind.as_str())
        .bind(&rec.entity_id)
        .bind(&rec.raw_json)
        .bind(rec.created_time)
        .bind(rec.updated_time)
        .bind(rec.last_modified_time)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch of raw records in one transaction.
    /// Returns how many rows were newly written (the rest already existed).
    pub async fn insert_raw_batch(&self, batch: &[NewRawRecord]) -> Result<u64> {
        let mut tx = self.begin().await?;
        let mut inserted = 0u64;

        for rec in batch {
            if self.insert_raw_record(&mut tx, rec).await? {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Distinct (kind, entity_id) units present in the raw store.
    /// Rows without an entity_id are audit-only and never normalized.
    pub async fn list_entity_units(&self) -> Result<Vec<EntityUnit>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT record_kind, entity_id
            FROM raw_records
            WHERE entity_id IS NOT NULL AND entity_id <> ''
            ORDER BY record_kind, entity_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut units = Vec::with_capacity(rows.len());
        for (kind, entity_id) in rows {
            match kind.parse::<RecordKind>() {
                Ok(kind) => units.push(EntityUnit { kind, entity_id }),
                Err(e) => warn!(entity_id = %entity_id, error = %e, "Skipping unit"),
            }
        }
        Ok(units)
    }

    /// All raw sightings of one entity, for authority selection.
    pub async fn raw_candidates(
        &self,
        kind: RecordKind,
        entity_id: &str,
    ) -> Result<Vec<RawRecord>> {
        let rows = sqlx::query_as::<_, RawRecord>(
            r#"
            SELECT source_file, line_no, record_kind, entity_id, raw_json,
                   created_time, updated_time, last_modified_time, ingested_at
            FROM raw_records
            WHERE record_kind = $1 AND entity_id = $2
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ========================================================================
    // Customer Upsert
    // ========================================================================

    /// Insert-or-update a customer row, last-write-wins on updated_at.
    /// The guard matters because customers arrive both from their own stream
    /// and embedded in invoice payloads.
    pub async fn upsert_customer(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        customer: &Customer,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                customer_id, customer_name, company_name, email, phone,
                country, raw_json, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (customer_id) DO UPDATE SET
                customer_name = EXCLUDED.customer_name,
                company_name = EXCLUDED.company_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                country = EXCLUDED.country,
                raw_json = EXCLUDED.raw_json,
                updated_at = EXCLUDED.updated_at
            WHERE COALESCE(EXCLUDED.updated_at, '1970-01-01'::timestamptz)
                > COALESCE(customers.updated_at, '1970-01-01'::timestamptz)
            "#,
        )
        .bind(&customer.customer_id)
        .bind(&customer.customer_name)
        .bind(&customer.company_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.country)
        .bind(&customer.raw_json)
        .bind(customer.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Invoice Upsert
    // ========================================================================

    /// Insert-or-update an invoice row. The caller has already chosen the
    /// authoritative raw record, so the replacement is unconditional and
    /// field-complete; no field-level merge that could let stale values
    /// linger.
    pub async fn upsert_invoice(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        invoice: &Invoice,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, invoice_number, date, due_date, status,
                current_sub_status, total, balance, currency_code,
                customer_id, customer_name, invoice_url,
                salesperson_id, salesperson_name,
                created_time, updated_time, last_modified_time, raw_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18)
            ON CONFLICT (invoice_id) DO UPDATE SET
                invoice_number = EXCLUDED.invoice_number,
                date = EXCLUDED.date,
                due_date = EXCLUDED.due_date,
                status = EXCLUDED.status,
                current_sub_status = EXCLUDED.current_sub_status,
                total = EXCLUDED.total,
                balance = EXCLUDED.balance,
                currency_code = EXCLUDED.currency_code,
                customer_id = EXCLUDED.customer_id,
                customer_name = EXCLUDED.customer_name,
                invoice_url = EXCLUDED.invoice_url,
                salesperson_id = EXCLUDED.salesperson_id,
                salesperson_name = EXCLUDED.salesperson_name,
                created_time = EXCLUDED.created_time,
                updated_time = EXCLUDED.updated_time,
                last_modified_time = EXCLUDED.last_modified_time,
                raw_json = EXCLUDED.raw_json
            "#,
        )
        .bind(&invoice.invoice_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.date)
        .bind(invoice.due_date)
        .bind(&invoice.status)
        .bind(&invoice.current_sub_status)
        .bind(invoice.total)
        .bind(invoice.balance)
        .bind(&invoice.currency_code)
        .bind(&invoice.customer_id)
        .bind(&invoice.customer_name)
        .bind(&invoice.invoice_url)
        .bind(&invoice.salesperson_id)
        .bind(&invoice.salesperson_name)
        .bind(invoice.created_time)
        .bind(invoice.updated_time)
        .bind(invoice.last_modified_time)
        .bind(&invoice.raw_json)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Insert-or-update one address slot of an invoice.
    pub async fn upsert_invoice_address(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        addr: &InvoiceAddress,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_addresses (
                invoice_id, kind, attention, address, street2,
                city, state, zipcode, country, phone, raw_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (invoice_id, kind) DO UPDATE SET
                attention = EXCLUDED.attention,
                address = EXCLUDED.address,
                street2 = EXCLUDED.street2,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                zipcode = EXCLUDED.zipcode,
                country = EXCLUDED.country,
                phone = EXCLUDED.phone,
                raw_json = EXCLUDED.raw_json
            "#,
        )
        .bind(&addr.invoice_id)
        .bind(&addr.kind)
        .bind(&addr.attention)
        .bind(&addr.address)
        .bind(&addr.street2)
        .bind(&addr.city)
        .bind(&addr.state)
        .bind(&addr.zipcode)
        .bind(&addr.country)
        .bind(&addr.phone)
        .bind(&addr.raw_json)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find an invoice by ID
    pub async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, date, due_date, status,
                   current_sub_status, total, balance, currency_code,
                   customer_id, customer_name, invoice_url,
                   salesperson_id, salesperson_name,
                   created_time, updated_time, last_modified_time, raw_json
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Find a customer by ID
    pub async fn find_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, customer_name, company_name, email, phone,
                   country, raw_json, updated_at
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// All address rows for an invoice
    pub async fn invoice_addresses(&self, invoice_id: &str) -> Result<Vec<InvoiceAddress>> {
        let rows = sqlx::query_as::<_, InvoiceAddress>(
            r#"
            SELECT invoice_id, kind, attention, address, street2,
                   city, state, zipcode, country, phone, raw_json
            FROM invoice_addresses
            WHERE invoice_id = $1
            ORDER BY kind
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
