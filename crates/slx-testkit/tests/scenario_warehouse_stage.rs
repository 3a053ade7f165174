//! Scenario: stock posting after payment.
//!
//! # Invariants under test
//! 1. The warehouse step runs only when a line resolved a warehouse code or
//!    the order carries transfers; otherwise the order completes without it.
//! 2. A sale split across movements posts one stock line per movement with
//!    ledger warehouse codes; quantities add up to the sale quantity.
//! 3. Transfer movements post as one transfer request per order.
//! 4. With stock codes required, goods without a warehouse code fail
//!    validation before any ledger call, unless the order is a cancellation.

use std::collections::BTreeMap;

use slx_posting::{OrderSource, PipelineFailure, PostingState, PostingStep};
use slx_reconcile::WarehouseCodeMap;
use slx_schemas::{MovementKind, RawSaleEvent};
use slx_testkit::*;

fn directory() -> MemDirectory {
    MemDirectory::default()
        .with_material("SP01", goods("M01"))
        .with_material("SP02", goods("M02"))
        .with_material("DV01", service("S01"))
        .with_branch(BRANCH, ledger_branch())
}

async fn post_one(
    h: &Harness,
    sales: &[RawSaleEvent],
    cfg: slx_posting::EngineConfig,
) -> slx_posting::OrderReport {
    slx_ingest::ingest_batch(h.store.as_ref(), sales, 5).await.unwrap();
    let bundles = h.store.load_orders(&["SO-1".to_string()]).await.unwrap();
    h.pipeline(cfg).post_bundles(bundles).await.pop().unwrap()
}

#[tokio::test]
async fn no_stock_work_skips_warehouse_step() {
    let h = Harness::new(directory());
    let report = post_one(&h, &[raw_sale("SO-1", "DV01", 1)], engine_config()).await;

    assert_eq!(report.final_state, PostingState::Done);
    assert!(report.steps.iter().all(|s| s.step != PostingStep::Warehouse));
    assert_eq!(h.ledger.endpoints_for("SO-1"), vec![Endpoint::SalesOrder, Endpoint::Invoice]);
}

#[tokio::test]
async fn split_movements_post_one_stock_line_each() {
    let h = Harness::new(directory());
    h.store
        .add_movement(movement("MV-1", "SO-1", "M01", 6, MovementKind::Out, "K01"))
        .unwrap();
    h.store
        .add_movement(movement("MV-2", "SO-1", "M01", 4, MovementKind::Out, "K02"))
        .unwrap();
    let mut unmatched = raw_sale("SO-1", "SP02", 3);
    unmatched.position_index = 1;
    let mut cfg = engine_config();
    cfg.warehouse_map = WarehouseCodeMap::new(BTreeMap::from([(
        "K01".to_string(),
        "WH-HCM".to_string(),
    )]));

    let report = post_one(&h, &[raw_sale("SO-1", "SP01", 10), unmatched], cfg).await;
    assert!(report.is_done());

    let issue = h
        .ledger
        .calls_for("SO-1")
        .into_iter()
        .find(|c| c.endpoint == Endpoint::StockIssue)
        .unwrap();
    let lines = issue.body["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["warehouseCode"], "WH-HCM");
    assert_eq!(lines[0]["quantity"], 6);
    assert_eq!(lines[1]["warehouseCode"], "K02");
    assert_eq!(lines[1]["quantity"], 4);

    // Detail keeps the unmatched line with its own quantity.
    let order = h
        .ledger
        .calls_for("SO-1")
        .into_iter()
        .find(|c| c.endpoint == Endpoint::SalesOrder)
        .unwrap();
    let qty: Vec<i64> = order.body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["quantity"].as_i64().unwrap())
        .collect();
    assert_eq!(qty, vec![6, 4, 3]);
}

#[tokio::test]
async fn transfers_post_as_one_request() {
    let h = Harness::new(directory());
    let mut t1 = movement("MV-T1", "SO-1", "M01", 2, MovementKind::Transfer, "K01");
    t1.related_warehouse_code = Some("K09".to_string());
    let t2 = movement("MV-T2", "SO-1", "M02", 1, MovementKind::Transfer, "K01");
    h.store.add_movement(t1).unwrap();
    h.store.add_movement(t2).unwrap();

    let report = post_one(&h, &[raw_sale("SO-1", "DV01", 1)], engine_config()).await;
    assert!(report.is_done());

    let transfers: Vec<_> = h
        .ledger
        .calls_for("SO-1")
        .into_iter()
        .filter(|c| c.endpoint == Endpoint::Transfer)
        .collect();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].body["lines"].as_array().unwrap().len(), 2);
    assert_eq!(transfers[0].body["lines"][0]["toWarehouse"], "K09");
}

#[tokio::test]
async fn required_stock_codes_block_goods_without_movements() {
    let h = Harness::new(directory());
    let mut cfg = engine_config();
    cfg.pipeline.require_stock_codes = true;

    let report = post_one(&h, &[raw_sale("SO-1", "SP01", 1)], cfg).await;
    assert_eq!(report.final_state, PostingState::Failed(PostingStep::Customer));
    assert!(matches!(report.failure, Some(PipelineFailure::Validation { .. })));
    assert!(h.ledger.calls().is_empty());
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn cancellation_passes_without_stock_codes() {
    let h = Harness::new(directory());
    let mut cfg = engine_config();
    cfg.pipeline.require_stock_codes = true;
    let mut sale = raw_sale("SO-1", "SP01", -1);
    sale.is_cancellation = true;

    let report = post_one(&h, &[sale], cfg).await;
    assert_eq!(report.final_state, PostingState::Done);
    assert!(!h.ledger.endpoints_for("SO-1").contains(&Endpoint::StockIssue));
}
