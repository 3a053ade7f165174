//! Scenario: one order's invoice fails inside a batch.
//!
//! # Invariants under test
//! 1. A genuine invoice failure stops that order at `FAILED:invoice`; its
//!    report keeps the sales-order result that already went through.
//! 2. Sibling orders in the same batch are unaffected.
//! 3. A failed order is neither marked posted nor sent to payment.
//! 4. A posting call that outlives the posting timeout is a transport failure,
//!    audited as ERROR.

use std::time::Duration;

use serde_json::json;
use slx_posting::{OrderSource, PipelineFailure, PostingState, PostingStep};
use slx_schemas::{AuditStatus, PaymentKind};
use slx_testkit::*;

async fn two_orders() -> Harness {
    let h = Harness::new(
        MemDirectory::default()
            .with_material("SP01", goods("M01"))
            .with_branch(BRANCH, ledger_branch()),
    );
    slx_ingest::ingest_batch(
        h.store.as_ref(),
        &[raw_sale("SO-1", "SP01", 1), raw_sale("SO-2", "SP01", 3)],
        5,
    )
    .await
    .unwrap();
    for code in ["SO-1", "SO-2"] {
        h.store
            .add_payment(payment(code, CASH_METHOD, PaymentKind::Other, 100_000))
            .unwrap();
    }
    h
}

async fn post_all(h: &Harness, cfg: slx_posting::EngineConfig) -> Vec<slx_posting::OrderReport> {
    let bundles = h
        .store
        .load_orders(&["SO-1".to_string(), "SO-2".to_string()])
        .await
        .unwrap();
    h.pipeline(cfg).post_bundles(bundles).await
}

#[tokio::test]
async fn invoice_failure_stops_only_that_order() {
    let h = two_orders().await;
    h.ledger.script(
        Endpoint::Invoice,
        "SO-1",
        Scripted::Reply(json!({"status": 0, "message": "Khách hàng bị khóa"})),
    );

    let reports = post_all(&h, engine_config()).await;
    assert_eq!(reports.len(), 2);
    let (failed, ok) = (&reports[0], &reports[1]);

    assert_eq!(failed.order_code, "SO-1");
    assert_eq!(failed.final_state, PostingState::Failed(PostingStep::Invoice));
    assert_eq!(
        failed.failure,
        Some(PipelineFailure::Rejected {
            step: PostingStep::Invoice,
            message: "Khách hàng bị khóa".to_string(),
        })
    );
    let sales_order = failed
        .steps
        .iter()
        .find(|s| s.step == PostingStep::SalesOrder)
        .unwrap();
    assert_eq!(sales_order.status, AuditStatus::Success);
    assert_eq!(sales_order.response["status"], 1);

    assert_eq!(h.ledger.endpoints_for("SO-1"), vec![Endpoint::SalesOrder, Endpoint::Invoice]);
    let last = h.audit.for_order("SO-1").pop().unwrap();
    assert_eq!((last.step.as_str(), last.status), ("invoice", AuditStatus::Error));

    assert_eq!(ok.order_code, "SO-2");
    assert!(ok.is_done());
    assert_eq!(
        h.ledger.endpoints_for("SO-2"),
        vec![Endpoint::SalesOrder, Endpoint::Invoice, Endpoint::CashReceipt]
    );

    let tracked = h.store.tracked("SO-1").unwrap();
    assert_eq!(tracked.state, "FAILED:invoice");
    assert_eq!(tracked.last_error.as_deref(), Some("ledger rejected invoice: Khách hàng bị khóa"));
    let bundles = h.store.load_orders(&["SO-1".to_string()]).await.unwrap();
    assert!(bundles[0].sales.iter().all(|s| !s.posted));
}

#[tokio::test]
async fn transport_error_is_a_step_failure() {
    let h = two_orders().await;
    h.ledger.script(
        Endpoint::SalesOrder,
        "SO-2",
        Scripted::Transport("connection reset by peer".to_string()),
    );

    let reports = post_all(&h, engine_config()).await;
    assert!(reports[0].is_done());
    assert_eq!(reports[1].final_state, PostingState::Failed(PostingStep::SalesOrder));
    assert!(matches!(
        reports[1].failure,
        Some(PipelineFailure::Transport { step: PostingStep::SalesOrder, ref message })
            if message == "connection reset by peer"
    ));
}

#[tokio::test]
async fn slow_posting_call_times_out() {
    let h = two_orders().await;
    h.ledger
        .script(Endpoint::Invoice, "SO-2", Scripted::Slow(Duration::from_millis(500)));
    let mut cfg = engine_config();
    cfg.pipeline.posting_timeout_ms = 20;

    let reports = post_all(&h, cfg).await;
    assert!(reports[0].is_done());
    assert_eq!(reports[1].final_state, PostingState::Failed(PostingStep::Invoice));

    let rec = h.audit.for_order("SO-2").pop().unwrap();
    assert_eq!(rec.status, AuditStatus::Error);
    assert_eq!(rec.error_message.as_deref(), Some("no answer within 20 ms"));
}
