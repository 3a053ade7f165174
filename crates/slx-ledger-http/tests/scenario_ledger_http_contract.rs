//! Scenario: HTTP ledger adapter contract.
//!
//! # Invariants under test
//! 1. Posting calls send the bearer token and return the ledger body as-is,
//!    failure statuses included, so the pipeline can normalise them.
//! 2. A non-JSON answer is a transport error.
//! 3. A posting call that outlives the posting timeout is a transport error.
//! 4. Lookups map 404 to "not found" and decode the camelCase wire shape.

use std::time::Duration;

use chrono::NaiveDate;
use httpmock::prelude::*;
use serde_json::json;
use slx_ingest::{BranchDirectory, Catalog, PromotionDirectory};
use slx_ledger_http::{HttpLedger, LedgerTimeouts, PATH_BRANCHES, PATH_CUSTOMERS, PATH_INVOICES, PATH_MATERIALS, PATH_PROMOTIONS};
use slx_posting::{
    CustomerPayload, LedgerCallError, LedgerClient, LedgerOrderPayload, OrderHeader,
};
use slx_schemas::ProductType;

fn ledger(server: &MockServer, timeouts: LedgerTimeouts) -> HttpLedger {
    HttpLedger::new(server.base_url(), Some("tok-1".to_string()), timeouts).unwrap()
}

fn order() -> LedgerOrderPayload {
    LedgerOrderPayload {
        header: OrderHeader {
            company_code: "CO1".to_string(),
            branch_code: None,
            customer_code: "C1".to_string(),
            currency: "VND".to_string(),
            fx_rate: 1.0,
            document_number: "SO-1".to_string(),
            document_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            channel_code: None,
            transaction_type: "BL".to_string(),
        },
        detail: vec![],
    }
}

#[tokio::test]
async fn posting_sends_bearer_and_returns_raw_body() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(PATH_CUSTOMERS)
                .header("authorization", "Bearer tok-1")
                .json_body(json!({"companyCode": "CO1", "customerCode": "C1", "customerName": null}));
            then.status(200).json_body(json!({"status": 1, "message": "ok"}));
        })
        .await;

    let body = ledger(&server, LedgerTimeouts::default())
        .create_customer(&CustomerPayload {
            company_code: "CO1".to_string(),
            customer_code: "C1".to_string(),
            customer_name: None,
        })
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(body["status"], 1);
}

#[tokio::test]
async fn failure_status_body_is_not_an_http_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(PATH_INVOICES);
            then.status(400)
                .json_body(json!([{"status": 0, "message": "Số hóa đơn đã tồn tại"}]));
        })
        .await;

    let body = ledger(&server, LedgerTimeouts::default())
        .submit_invoice(&order())
        .await
        .unwrap();
    assert_eq!(body[0]["message"], "Số hóa đơn đã tồn tại");
}

#[tokio::test]
async fn non_json_answer_is_transport_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(PATH_INVOICES);
            then.status(502).body("<html>bad gateway</html>");
        })
        .await;

    let err = ledger(&server, LedgerTimeouts::default())
        .submit_invoice(&order())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerCallError::Transport(ref m) if m.contains("502")));
}

#[tokio::test]
async fn slow_posting_call_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(PATH_INVOICES);
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({"status": 1}));
        })
        .await;

    let timeouts = LedgerTimeouts {
        lookup: Duration::from_millis(50),
        posting: Duration::from_millis(50),
    };
    let err = ledger(&server, timeouts).submit_invoice(&order()).await.unwrap_err();
    assert!(matches!(err, LedgerCallError::Transport(_)));
}

#[tokio::test]
async fn lookups_decode_and_map_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(PATH_MATERIALS).query_param("code", "SP01");
            then.status(200).json_body(json!({
                "materialCode": "M01", "unit": "EA", "productType": "I",
                "trackBatch": true, "category": "MP"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(PATH_BRANCHES).query_param("code", "HCM01");
            then.status(200)
                .json_body(json!({"ledgerCompanyCode": "CO1", "ledgerBranchCode": "BR1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(PATH_PROMOTIONS);
            then.status(404);
        })
        .await;

    let l = ledger(&server, LedgerTimeouts::default());
    let p = l.get_material("SP01").await.unwrap().unwrap();
    assert_eq!(p.material_code, "M01");
    assert_eq!(p.product_type, ProductType::Goods);
    assert!(p.track_batch);

    let b = l.get_branch("HCM01").await.unwrap().unwrap();
    assert_eq!(b.ledger_company_code.as_deref(), Some("CO1"));

    assert!(l.get_promotion("KM01").await.unwrap().is_none());
}
