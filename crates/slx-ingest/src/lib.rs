//! slx-ingest
//!
//! Dedup normalizer. Raw sale events from any feed become canonical sales
//! keyed by a natural key, so re-running ingestion for a period never
//! creates duplicate lines.
//!
//! This crate does not own storage; it drives a [`SaleStore`] and reports
//! what happened. Malformed events are skipped and counted.

pub mod lookup;
pub mod normalizer;

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use slx_schemas::{CanonicalSale, RawSaleEvent};
use tracing::{info, warn};

pub use lookup::{
    prefetch_lookups, BranchDirectory, Catalog, DistinctCodes, LookupCache, PrefetchSettings,
    PromotionDirectory,
};
pub use normalizer::{canonicalize, natural_key, NormalizeError};

/// What the store did with one canonical sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestOutcome {
    Created,
    /// Existing key; descriptive fields changed.
    Updated,
    /// Existing key; nothing to change.
    Skipped,
}

/// Storage seam for canonical sales.
///
/// `upsert_sale` must insert when the natural key is new (`posted = false`)
/// and otherwise overwrite only the descriptive fields. Key fields and the
/// `posted` flag of an existing row are never touched.
#[async_trait::async_trait]
pub trait SaleStore: Send + Sync {
    async fn upsert_sale(&self, sale: &CanonicalSale) -> Result<IngestOutcome>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub codes: DistinctCodes,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.malformed
    }

    fn count(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Created => self.created += 1,
            IngestOutcome::Updated => self.updated += 1,
            IngestOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Ingest one event.
pub async fn ingest(store: &dyn SaleStore, ev: &RawSaleEvent) -> Result<IngestOutcome> {
    let sale = canonicalize(ev).context("malformed sale event")?;
    store
        .upsert_sale(&sale)
        .await
        .with_context(|| format!("upsert sale {}", sale.natural_key))
}

/// Ingest a batch with at most `concurrency` store calls in flight.
///
/// Malformed events are counted and skipped. A store error aborts the batch:
/// every event already written stays written and a re-run picks up the rest.
pub async fn ingest_batch(
    store: &dyn SaleStore,
    events: &[RawSaleEvent],
    concurrency: usize,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut valid: Vec<CanonicalSale> = Vec::with_capacity(events.len());

    for ev in events {
        match canonicalize(ev) {
            Ok(sale) => {
                report.codes.materials.insert(sale.item_code.clone());
                report.codes.branches.insert(sale.branch_code.clone());
                valid.push(sale);
            }
            Err(err) => {
                warn!(source = %ev.source, position_index = ev.position_index, error = %err, "skipping malformed sale event");
                report.malformed += 1;
            }
        }
    }

    let outcomes: Vec<Result<IngestOutcome>> = stream::iter(valid.iter())
        .map(|sale| async move {
            store
                .upsert_sale(sale)
                .await
                .with_context(|| format!("upsert sale {}", sale.natural_key))
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        report.count(outcome?);
    }

    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        malformed = report.malformed,
        materials = report.codes.materials.len(),
        branches = report.codes.branches.len(),
        "ingestion batch complete"
    );
    Ok(report)
}
