//! Scenario: the audit trail mirrors the ledger traffic.
//!
//! # Invariants under test
//! 1. Every ledger call, success or failure, has exactly one audit record
//!    carrying the request that was sent.
//! 2. An audit write failure stops the order at the step whose call it was
//!    recording; nothing further reaches the ledger.
//! 3. The batch summary bounds its error list.

use serde_json::json;
use slx_posting::{OrderSource, PipelineFailure, PostingState, PostingStep};
use slx_schemas::{AuditStatus, MovementKind, PaymentKind};
use slx_testkit::*;

fn directory() -> MemDirectory {
    MemDirectory::default()
        .with_material("SP01", goods("M01"))
        .with_branch(BRANCH, ledger_branch())
}

#[tokio::test]
async fn audit_records_match_ledger_calls() {
    let h = Harness::new(directory());
    slx_ingest::ingest_batch(
        h.store.as_ref(),
        &[raw_sale("SO-1", "SP01", 2), raw_sale("SO-2", "SP01", 1)],
        5,
    )
    .await
    .unwrap();
    h.store.add_payment(payment("SO-1", BANK_METHOD, PaymentKind::Other, 200_000)).unwrap();
    h.store
        .add_movement(movement("MV-1", "SO-1", "M01", 2, MovementKind::Out, "K01"))
        .unwrap();
    h.ledger.script(
        Endpoint::SalesOrder,
        "SO-2",
        Scripted::Reply(json!({"status": 0, "message": "Sai mã kho"})),
    );

    h.pipeline(engine_config()).post_range(day(1), day(1)).await.unwrap();

    for order in ["SO-1", "SO-2"] {
        let mut sent: Vec<_> = h.ledger.calls_for(&format!("CUST-{order}"));
        sent.extend(h.ledger.calls_for(order));
        let audited = h.audit.for_order(order);
        assert_eq!(audited.len(), sent.len(), "order {order}");
        for (rec, call) in audited.iter().zip(sent.iter()) {
            assert_eq!(rec.request_payload, call.body, "order {order} step {}", rec.step);
        }
    }
    assert_eq!(h.audit.records().len(), h.ledger.calls().len());

    let so2 = h.audit.for_order("SO-2");
    assert_eq!(so2.last().map(|r| r.status), Some(AuditStatus::Error));
    assert_eq!(so2.last().and_then(|r| r.error_message.clone()).as_deref(), Some("Sai mã kho"));
}

#[tokio::test]
async fn audit_failure_stops_the_order() {
    let h = Harness::new(directory());
    slx_ingest::ingest_batch(h.store.as_ref(), &[raw_sale("SO-1", "SP01", 1)], 5)
        .await
        .unwrap();
    h.audit.fail_writes(true);

    let bundles = h.store.load_orders(&["SO-1".to_string()]).await.unwrap();
    let report = h.pipeline(engine_config()).post_bundles(bundles).await.pop().unwrap();

    assert_eq!(report.final_state, PostingState::Failed(PostingStep::Customer));
    assert!(matches!(
        report.failure,
        Some(PipelineFailure::Audit { step: PostingStep::Customer, .. })
    ));
    assert_eq!(h.ledger.calls().len(), 1);
    assert!(h.store.posted_flags().values().all(|p| !p));
}

#[tokio::test]
async fn summary_error_list_is_bounded() {
    let h = Harness::new(directory());
    let events: Vec<_> = (1..=4).map(|i| raw_sale(&format!("SO-{i}"), "SP01", 1)).collect();
    slx_ingest::ingest_batch(h.store.as_ref(), &events, 5).await.unwrap();
    for i in 1..=4 {
        h.ledger.script(
            Endpoint::Invoice,
            &format!("SO-{i}"),
            Scripted::Reply(json!({"status": 0, "message": "locked"})),
        );
    }
    let mut cfg = engine_config();
    cfg.pipeline.error_list_limit = 3;

    let summary = h.pipeline(cfg).post_range(day(1), day(1)).await.unwrap();
    assert_eq!((summary.total, summary.failed), (4, 4));
    assert_eq!(summary.errors.len(), 3);
    assert_eq!(summary.errors_omitted, 1);
    assert_eq!(summary.errors[0].order_code, "SO-1");
}
