//! scenario_idempotent_ingestion
//!
//! Invariant under test: ingesting the same events twice yields one row per
//! natural key. The second run creates nothing, leaves `posted` flags alone
//! and only rewrites descriptive fields.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::NaiveDate;
use slx_ingest::{ingest, ingest_batch, IngestOutcome, SaleStore};
use slx_schemas::{CanonicalSale, RawSaleEvent, SaleAmounts};

#[derive(Default)]
struct MemStore {
    rows: Mutex<BTreeMap<String, CanonicalSale>>,
}

#[async_trait::async_trait]
impl SaleStore for MemStore {
    async fn upsert_sale(&self, sale: &CanonicalSale) -> Result<IngestOutcome> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&sale.natural_key) {
            None => {
                rows.insert(sale.natural_key.clone(), sale.clone());
                Ok(IngestOutcome::Created)
            }
            Some(existing) if existing.descriptive == sale.descriptive => Ok(IngestOutcome::Skipped),
            Some(existing) => {
                existing.descriptive = sale.descriptive.clone();
                Ok(IngestOutcome::Updated)
            }
        }
    }
}

fn event(order: &str, item: Option<&str>, pos: u32) -> RawSaleEvent {
    RawSaleEvent {
        source: "pos".to_string(),
        source_native_id: Some(format!("{order}-{pos}")),
        position_index: pos,
        order_code: Some(order.to_string()),
        order_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        branch_code: "HN01".to_string(),
        item_code: item.map(str::to_string),
        item_name: Some("Kem".to_string()),
        category_tags: vec!["skin".to_string()],
        quantity: 1,
        unit_price: 50_000,
        revenue: 50_000,
        subtotal: None,
        line_total: None,
        amounts: SaleAmounts::default(),
        order_type_label: "01.Thường".to_string(),
        brand: "ACME".to_string(),
        is_wholesale: false,
        is_gift: false,
        is_marketplace: false,
        is_cancellation: false,
        promotion_code: None,
        serial: None,
        customer_id: "C1".to_string(),
        customer_name: None,
        channel_code: None,
        tax_rate: None,
        discount_account: None,
        expense_account: None,
        fee_code: None,
    }
}

fn batch() -> Vec<RawSaleEvent> {
    vec![
        event("SO-1", Some("SP01"), 0),
        event("SO-1", Some("SP02"), 1),
        event("SO-2", Some("SP01"), 0),
        event("SO-3", None, 0),
    ]
}

#[tokio::test]
async fn second_run_creates_nothing() {
    let store = MemStore::default();

    let first = ingest_batch(&store, &batch(), 5).await.unwrap();
    assert_eq!((first.created, first.updated, first.skipped, first.malformed), (3, 0, 0, 1));
    assert_eq!(first.total(), 4);
    assert_eq!(
        first.codes.materials.iter().cloned().collect::<Vec<_>>(),
        vec!["SP01".to_string(), "SP02".to_string()]
    );
    assert_eq!(first.codes.branches.len(), 1);

    // Mark one row posted between runs.
    store
        .rows
        .lock()
        .unwrap()
        .values_mut()
        .next()
        .unwrap()
        .posted = true;

    let second = ingest_batch(&store, &batch(), 2).await.unwrap();
    assert_eq!((second.created, second.updated, second.skipped, second.malformed), (0, 0, 3, 1));

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.values().filter(|r| r.posted).count(), 1);
}

#[tokio::test]
async fn renamed_item_updates_descriptive_fields_only() {
    let store = MemStore::default();
    let ev = event("SO-9", Some("SP09"), 0);
    assert_eq!(ingest(&store, &ev).await.unwrap(), IngestOutcome::Created);

    let mut renamed = ev.clone();
    renamed.item_name = Some("Kem dưỡng".to_string());
    assert_eq!(ingest(&store, &renamed).await.unwrap(), IngestOutcome::Updated);

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    let row = rows.values().next().unwrap();
    assert_eq!(row.descriptive.item_name.as_deref(), Some("Kem dưỡng"));
    assert_eq!(row.quantity, 1);
}

#[tokio::test]
async fn single_malformed_event_is_an_error() {
    let store = MemStore::default();
    let err = ingest(&store, &event("SO-1", None, 0)).await.unwrap_err();
    assert!(format!("{err:#}").contains("no item code"));
}
