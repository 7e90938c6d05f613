//! Normalizer engine
//!
//! Core logic for turning the append-only raw history into one
//! authoritative row per entity: unit listing, authority selection,
//! typed parsing, and the per-entity transactional upsert, dispatched
//! across a bounded worker pool.

use crate::errors::NormalizerError;
use crate::payload::{CustomerPayload, InvoicePayload};
use billflow_common::config::NormalizerConfig;
use billflow_common::db::models::{RawRecord, RecordKind};
use billflow_common::db::EntityUnit;
use billflow_common::errors::AppError;
use billflow_common::Repository;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// A unit that was skipped or failed, reported at end of run.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub key: String,
    pub reason: String,
}

/// Outcome of a full engine run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Units dispatched this run
    pub units: usize,
    pub customers_upserted: u64,
    pub invoices_upserted: u64,
    pub addresses_upserted: u64,
    /// Malformed units, skipped
    pub skipped: Vec<UnitReport>,
    /// Units whose upsert failed after retries
    pub failed: Vec<UnitReport>,
}

impl RunSummary {
    /// True when every listed unit normalized cleanly.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    fn absorb(&mut self, outcome: UnitOutcome) {
        self.customers_upserted += outcome.customers;
        self.invoices_upserted += outcome.invoices;
        self.addresses_upserted += outcome.addresses;
    }
}

#[derive(Debug, Default)]
struct UnitOutcome {
    customers: u64,
    invoices: u64,
    addresses: u64,
}

/// Normalizer engine. Cheap to clone; one clone runs per in-flight unit.
#[derive(Clone)]
pub struct NormalizerProcessor {
    repository: Repository,
    config: NormalizerConfig,
    skip_customers: bool,
}

impl NormalizerProcessor {
    pub fn new(repository: Repository, config: NormalizerConfig, skip_customers: bool) -> Self {
        Self {
            repository,
            config,
            skip_customers,
        }
    }

    /// Run the engine over the whole raw store.
    ///
    /// Units are independent (entity ids partition the work) and are
    /// dispatched into a bounded worker pool. Setting `cancel` stops
    /// dispatch immediately; in-flight transactions finish or roll back.
    /// Per-unit failures are collected into the summary; only fatal
    /// errors (store unreachable, schema missing) abort the run.
    pub async fn run(&self, cancel: Arc<AtomicBool>) -> Result<RunSummary, NormalizerError> {
        let units = self.repository.list_entity_units().await.map_err(NormalizerError::App)?;

        let mut summary = RunSummary::default();
        info!(units = units.len(), workers = self.config.workers, "Starting normalization run");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set: JoinSet<(EntityUnit, Result<UnitOutcome, NormalizerError>)> =
            JoinSet::new();

        for unit in units {
            if self.skip_customers && unit.kind == RecordKind::Customer {
                continue;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            // Checked after the permit wait: a cancel that arrives while
            // the dispatcher is blocked must not dispatch one more unit
            if cancel.load(Ordering::SeqCst) {
                warn!("Cancellation requested, no further units will be dispatched");
                break;
            }
            summary.units += 1;
            let worker = self.clone();
            join_set.spawn(async move {
                let result = worker.process_unit(&unit).await;
                drop(permit);
                (unit, result)
            });
        }

        let mut fatal: Option<NormalizerError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.absorb(outcome),
                Ok((unit, Err(e))) => {
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    } else {
                        match e {
                            NormalizerError::Malformed { key, message } => {
                                warn!(unit = %key, reason = %message, "Skipping malformed unit");
                                summary.skipped.push(UnitReport { key, reason: message });
                            }
                            other => {
                                error!(unit = %unit.key(), error = %other, "Unit upsert failed");
                                summary.failed.push(UnitReport {
                                    key: unit.key(),
                                    reason: other.to_string(),
                                });
                            }
                        }
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "Worker task panicked");
                    summary.failed.push(UnitReport {
                        key: "<worker>".into(),
                        reason: join_err.to_string(),
                    });
                }
            }
        }

        if let Some(fatal) = fatal {
            return Err(fatal);
        }

        info!(
            customers = summary.customers_upserted,
            invoices = summary.invoices_upserted,
            addresses = summary.addresses_upserted,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Normalization run complete"
        );

        Ok(summary)
    }

    /// Normalize one entity: pick its authoritative raw record and upsert
    /// the derived rows, all-or-nothing.
    #[instrument(skip(self), fields(unit = %unit.key()))]
    async fn process_unit(&self, unit: &EntityUnit) -> Result<UnitOutcome, NormalizerError> {
        let candidates = self
            .with_retry(|| self.repository.raw_candidates(unit.kind, &unit.entity_id))
            .await?;

        let Some(authoritative) = select_authoritative(candidates) else {
            debug!("No raw candidates, nothing to do");
            return Ok(UnitOutcome::default());
        };

        debug!(record = %authoritative.key(), "Selected authoritative record");

        match unit.kind {
            RecordKind::Customer => self.upsert_customer_unit(unit, &authoritative).await,
            RecordKind::Invoice => self.upsert_invoice_unit(unit, &authoritative).await,
        }
    }

    async fn upsert_customer_unit(
        &self,
        unit: &EntityUnit,
        record: &RawRecord,
    ) -> Result<UnitOutcome, NormalizerError> {
        let payload = CustomerPayload::parse(record)
            .map_err(|e| NormalizerError::malformed(unit.key(), e))?;
        let customer = payload.customer_row(&unit.entity_id, record);

        self.with_retry(|| async {
            let mut tx = self.repository.begin().await?;
            self.repository.upsert_customer(&mut tx, &customer).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        Ok(UnitOutcome {
            customers: 1,
            ..Default::default()
        })
    }

    async fn upsert_invoice_unit(
        &self,
        unit: &EntityUnit,
        record: &RawRecord,
    ) -> Result<UnitOutcome, NormalizerError> {
        let payload = InvoicePayload::parse(record)
            .map_err(|e| NormalizerError::malformed(unit.key(), e))?;

        let invoice = payload.invoice_row(&unit.entity_id, record);
        let addresses = payload.address_rows(&unit.entity_id, record);
        let customer = if self.skip_customers {
            None
        } else {
            payload.embedded_customer(record)
        };

        // One transaction per entity: the invoice, its addresses, and the
        // embedded customer land together or not at all.
        self.with_retry(|| async {
            let mut tx = self.repository.begin().await?;
            if let Some(customer) = &customer {
                self.repository.upsert_customer(&mut tx, customer).await?;
            }
            self.repository.upsert_invoice(&mut tx, &invoice).await?;
            for addr in &addresses {
                self.repository.upsert_invoice_address(&mut tx, addr).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        Ok(UnitOutcome {
            customers: customer.is_some() as u64,
            invoices: 1,
            addresses: addresses.len() as u64,
        })
    }

    /// Retry a database operation on transient failures with exponential
    /// backoff, bounded by both attempt count and elapsed time.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let policy = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.retry_base_ms),
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_budget_secs)),
            ..Default::default()
        };
        let max_retries = self.config.max_retries;
        let attempts = AtomicU32::new(0);

        backoff::future::retry(policy, || {
            let fut = op();
            let attempts = &attempts;
            async move {
                fut.await.map_err(|e| {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if e.is_transient() && attempt <= max_retries {
                        warn!(attempt, error = %e, "Transient database error, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}

/// Choose the authoritative record among all raw sightings of one entity.
///
/// Last-write-wins on each record's best available timestamp
/// (last_modified_time, else updated_time, else created_time), falling
/// back to raw insertion order when a record has none. See
/// [`RawRecord::authority_key`] for the exact ordering.
pub fn select_authoritative(candidates: Vec<RawRecord>) -> Option<RawRecord> {
    candidates.into_iter().max_by_key(|r| r.authority_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn raw(
        line_no: i64,
        lmt: Option<DateTime<Utc>>,
        ut: Option<DateTime<Utc>>,
        ct: Option<DateTime<Utc>>,
        total: &str,
    ) -> RawRecord {
        RawRecord {
            source_file: "invoices.jsonl".into(),
            line_no,
            record_kind: "invoice".into(),
            entity_id: Some("INV-1".into()),
            raw_json: json!({"invoice_id": "INV-1", "total": total}),
            created_time: ct,
            updated_time: ut,
            last_modified_time: lmt,
            ingested_at: Utc
                .with_ymd_and_hms(2026, 6, 1, 0, 0, line_no as u32)
                .unwrap(),
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_precedence_latest_last_modified_wins() {
        // Insertion order deliberately reversed
        let winner = select_authoritative(vec![
            raw(2, Some(ts(2)), None, None, "150.00"),
            raw(1, Some(ts(1)), None, None, "100.00"),
        ])
        .unwrap();
        assert_eq!(winner.raw_json["total"], "150.00");
    }

    #[test]
    fn test_best_timestamp_compared_across_records() {
        // One record has only a stale last_modified_time, the other only a
        // fresher updated_time; the fresher record is authoritative
        let winner = select_authoritative(vec![
            raw(1, Some(ts(1)), None, None, "stale"),
            raw(2, None, Some(ts(5)), None, "fresh"),
        ])
        .unwrap();
        assert_eq!(winner.line_no, 2);
    }

    #[test]
    fn test_fallback_chain() {
        // No last_modified_time anywhere: updated_time decides
        let winner = select_authoritative(vec![
            raw(1, None, Some(ts(5)), Some(ts(1)), "a"),
            raw(2, None, Some(ts(4)), Some(ts(9)), "b"),
        ])
        .unwrap();
        assert_eq!(winner.line_no, 1);

        // Neither of those: created_time decides
        let winner = select_authoritative(vec![
            raw(1, None, None, Some(ts(3)), "a"),
            raw(2, None, None, Some(ts(7)), "b"),
        ])
        .unwrap();
        assert_eq!(winner.line_no, 2);
    }

    #[test]
    fn test_all_null_latest_ingested_wins() {
        let winner = select_authoritative(vec![
            raw(1, None, None, None, "first"),
            raw(3, None, None, None, "last"),
            raw(2, None, None, None, "middle"),
        ])
        .unwrap();
        assert_eq!(winner.line_no, 3);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_authoritative(Vec::new()).is_none());
    }

    #[test]
    fn test_summary_clean_only_without_skips_or_failures() {
        let mut summary = RunSummary::default();
        summary.units = 3;
        summary.invoices_upserted = 3;
        assert!(summary.is_clean());

        summary.skipped.push(UnitReport {
            key: "invoice/INV-2".into(),
            reason: "total is not a number".into(),
        });
        assert!(!summary.is_clean());

        let mut failed_only = RunSummary::default();
        failed_only.failed.push(UnitReport {
            key: "customer/CUS-1".into(),
            reason: "retries exhausted".into(),
        });
        assert!(!failed_only.is_clean());
    }
}
