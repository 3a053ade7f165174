//! Fixture builders. Values are plain and predictable so tests can state
//! expectations directly.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use slx_posting::{DocumentType, EngineConfig};
use slx_schemas::{
    BranchInfo, MovementKind, OrderPayment, PaymentKind, ProductCategory, ProductInfo, ProductType,
    RawSaleEvent, SaleAmounts, WarehouseMovement,
};

pub const BRANCH: &str = "HCM01";
pub const COMPANY: &str = "CO1";
pub const CASH_METHOD: &str = "TM";
pub const BANK_METHOD: &str = "CK";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap_or_default()
}

/// Standard retail sale line at 100 000 per unit, dated 2024-03-01.
pub fn raw_sale(order_code: &str, item_code: &str, quantity: i64) -> RawSaleEvent {
    RawSaleEvent {
        source: "pos".to_string(),
        source_native_id: None,
        position_index: 0,
        order_code: Some(order_code.to_string()),
        order_date: day(1),
        branch_code: BRANCH.to_string(),
        item_code: Some(item_code.to_string()),
        item_name: Some(format!("Item {item_code}")),
        category_tags: vec![],
        quantity,
        unit_price: 100_000,
        revenue: 100_000 * quantity,
        subtotal: None,
        line_total: None,
        amounts: SaleAmounts::default(),
        order_type_label: "01.Thường".to_string(),
        brand: "F3".to_string(),
        is_wholesale: false,
        is_gift: false,
        is_marketplace: false,
        is_cancellation: false,
        promotion_code: None,
        serial: None,
        customer_id: format!("CUST-{order_code}"),
        customer_name: Some("Nguyen Van A".to_string()),
        channel_code: None,
        tax_rate: Some(10),
        discount_account: None,
        expense_account: None,
        fee_code: None,
    }
}

pub fn goods(material_code: &str) -> ProductInfo {
    ProductInfo {
        material_code: material_code.to_string(),
        unit: "EA".to_string(),
        product_type: ProductType::Goods,
        track_batch: false,
        track_serial: false,
        category: ProductCategory::Cosmetics,
        sub_category: None,
        is_ecode: false,
    }
}

pub fn service(material_code: &str) -> ProductInfo {
    ProductInfo {
        product_type: ProductType::Service,
        ..goods(material_code)
    }
}

pub fn ledger_branch() -> BranchInfo {
    BranchInfo {
        ledger_company_code: Some(COMPANY.to_string()),
        ledger_branch_code: Some("BR1".to_string()),
    }
}

pub fn movement(
    id: &str,
    order_code: &str,
    material_code: &str,
    quantity: i64,
    kind: MovementKind,
    warehouse_code: &str,
) -> WarehouseMovement {
    WarehouseMovement {
        movement_id: id.to_string(),
        order_code: order_code.to_string(),
        material_code: material_code.to_string(),
        quantity,
        batch: None,
        serial: None,
        kind,
        warehouse_code: warehouse_code.to_string(),
        related_warehouse_code: None,
    }
}

pub fn payment(order_code: &str, method_code: &str, kind: PaymentKind, amount: i64) -> OrderPayment {
    OrderPayment {
        order_code: order_code.to_string(),
        method_code: method_code.to_string(),
        kind,
        amount,
    }
}

/// Defaults plus a cash and a bank payment method.
pub fn engine_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.pipeline.payment_doc_types = BTreeMap::from([
        (CASH_METHOD.to_string(), DocumentType::Cash),
        (BANK_METHOD.to_string(), DocumentType::Bank),
    ]);
    cfg
}
