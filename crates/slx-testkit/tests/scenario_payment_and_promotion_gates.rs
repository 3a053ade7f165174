//! Scenario: promotion and payment checks that gate ledger calls.
//!
//! # Invariants under test
//! 1. Cash and bank methods route to their own receipt endpoints.
//! 2. E-wallet and voucher records settle through discount buckets, not
//!    receipts.
//! 3. A payment method with no declared document type fails the order at
//!    `FAILED:payment` before any receipt is sent.
//! 4. A promotion code unknown to the directory fails the order at
//!    `FAILED:invoice` before any ledger call, so neither the sales order
//!    nor the invoice carrying it is submitted.

use slx_posting::{OrderSource, PipelineFailure, PostingState, PostingStep};
use slx_schemas::{PaymentKind, PromotionInfo};
use slx_testkit::*;

fn directory() -> MemDirectory {
    MemDirectory::default()
        .with_material("SP01", goods("M01"))
        .with_branch(BRANCH, ledger_branch())
        .with_promotion("KM01.I", PromotionInfo::default())
}

async fn post_one(h: &Harness, code: &str) -> slx_posting::OrderReport {
    let bundles = h.store.load_orders(&[code.to_string()]).await.unwrap();
    h.pipeline(engine_config())
        .post_bundles(bundles)
        .await
        .pop()
        .unwrap()
}

#[tokio::test]
async fn payments_route_by_document_type() {
    let h = Harness::new(directory());
    slx_ingest::ingest_batch(h.store.as_ref(), &[raw_sale("SO-1", "SP01", 3)], 5)
        .await
        .unwrap();
    h.store.add_payment(payment("SO-1", CASH_METHOD, PaymentKind::Other, 100_000)).unwrap();
    h.store.add_payment(payment("SO-1", BANK_METHOD, PaymentKind::Other, 150_000)).unwrap();
    h.store.add_payment(payment("SO-1", "VIMO", PaymentKind::EWalletCredit, 50_000)).unwrap();

    let report = post_one(&h, "SO-1").await;
    assert!(report.is_done());
    assert_eq!(
        h.ledger.endpoints_for("SO-1"),
        vec![Endpoint::SalesOrder, Endpoint::Invoice, Endpoint::CashReceipt, Endpoint::BankReceipt]
    );
    let bank = h
        .ledger
        .calls_for("SO-1")
        .into_iter()
        .find(|c| c.endpoint == Endpoint::BankReceipt)
        .unwrap();
    assert_eq!(bank.body["amount"], 150_000);
    assert_eq!(bank.body["methodCode"], BANK_METHOD);
}

#[tokio::test]
async fn undeclared_document_type_fails_payment() {
    let h = Harness::new(directory());
    slx_ingest::ingest_batch(h.store.as_ref(), &[raw_sale("SO-1", "SP01", 1)], 5)
        .await
        .unwrap();
    h.store.add_payment(payment("SO-1", CASH_METHOD, PaymentKind::Other, 40_000)).unwrap();
    h.store.add_payment(payment("SO-1", "MOMO", PaymentKind::Other, 60_000)).unwrap();

    let report = post_one(&h, "SO-1").await;
    assert_eq!(report.final_state, PostingState::Failed(PostingStep::Payment));
    assert_eq!(
        report.failure,
        Some(PipelineFailure::Validation {
            step: PostingStep::Payment,
            reason: "payment method 'MOMO' has no document type".to_string(),
        })
    );
    assert_eq!(h.ledger.endpoints_for("SO-1"), vec![Endpoint::SalesOrder, Endpoint::Invoice]);
    assert_eq!(h.store.tracked("SO-1").unwrap().state, "FAILED:payment");
}

#[tokio::test]
async fn unknown_promotion_code_blocks_invoice() {
    let h = Harness::new(directory());
    let mut sale = raw_sale("SO-1", "SP01", 1);
    sale.promotion_code = Some("KM99-2024".to_string());
    slx_ingest::ingest_batch(h.store.as_ref(), &[sale], 5).await.unwrap();

    let report = post_one(&h, "SO-1").await;
    assert_eq!(report.final_state, PostingState::Failed(PostingStep::Invoice));
    assert_eq!(
        report.failure,
        Some(PipelineFailure::Validation {
            step: PostingStep::Invoice,
            reason: "unknown promotion code 'KM99.I'".to_string(),
        })
    );
    assert!(h.ledger.endpoints_for("SO-1").is_empty());
    assert!(h.ledger.calls().is_empty());
    assert_eq!(h.store.tracked("SO-1").unwrap().state, "FAILED:invoice");
}

#[tokio::test]
async fn known_promotion_code_passes() {
    let h = Harness::new(directory());
    let mut sale = raw_sale("SO-1", "SP01", 1);
    sale.promotion_code = Some("KM01".to_string());
    slx_ingest::ingest_batch(h.store.as_ref(), &[sale], 5).await.unwrap();

    let report = post_one(&h, "SO-1").await;
    assert!(report.is_done());
    assert_eq!(h.directory.promotion_calls(), 1);
}
