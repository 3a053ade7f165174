//! scenario_matching_rules
//!
//! Invariant under test: the match key falls back from material code to the
//! raw item code, card-split lines only match movements of equal signed
//! quantity, and warehouse codes are translated through the mapping table
//! (unmapped codes pass through).

use chrono::NaiveDate;
use slx_reconcile::{explode, explode_order, LineContext, WarehouseCodeMap};
use slx_schemas::{CanonicalSale, MovementKind, SaleAmounts, SaleDescriptive, WarehouseMovement};

fn sale(item: &str, qty: i64) -> CanonicalSale {
    CanonicalSale {
        natural_key: format!("SO-C|{item}|{qty}"),
        source: "pos".to_string(),
        source_native_id: None,
        position_index: 0,
        order_code: "SO-C".to_string(),
        order_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        branch_code: "HN01".to_string(),
        item_code: item.to_string(),
        quantity: qty,
        unit_price: 500,
        revenue: 500 * qty,
        subtotal: None,
        line_total: None,
        amounts: SaleAmounts::default(),
        order_type_label: "Tách thẻ".to_string(),
        brand: "ACME".to_string(),
        is_wholesale: false,
        is_gift: false,
        is_marketplace: false,
        is_cancellation: false,
        promotion_code: None,
        serial: Some("SER-1".to_string()),
        customer_id: "C2".to_string(),
        channel_code: None,
        tax_rate: None,
        discount_account: None,
        expense_account: None,
        fee_code: None,
        descriptive: SaleDescriptive::default(),
        posted: false,
    }
}

fn mv(id: &str, material: &str, qty: i64, wh: &str) -> WarehouseMovement {
    WarehouseMovement {
        movement_id: id.to_string(),
        order_code: "SO-C".to_string(),
        material_code: material.to_string(),
        quantity: qty,
        batch: None,
        serial: None,
        kind: if qty < 0 { MovementKind::In } else { MovementKind::Out },
        warehouse_code: wh.to_string(),
        related_warehouse_code: None,
    }
}

#[test]
fn falls_back_to_item_code_when_material_has_no_movement() {
    let movements = vec![mv("m1", "SP-RAW", 2, "K9")];
    let ctx = LineContext {
        material_code: Some("MAT-X".to_string()),
        card_split: false,
    };
    let lines = explode(&sale("SP-RAW", 2), &ctx, &movements, &WarehouseCodeMap::default());
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].movement_id.as_deref(), Some("m1"));
    assert_eq!(lines[0].material_code, "SP-RAW");
    assert_eq!(lines[0].serial.as_deref(), Some("SER-1"));
}

#[test]
fn card_split_pairs_movements_by_signed_quantity() {
    let movements = vec![mv("in", "MAT", -1, "K1"), mv("out", "MAT", 1, "K2")];
    let ctx = LineContext {
        material_code: Some("MAT".to_string()),
        card_split: true,
    };
    let lines = vec![(sale("SP", 1), ctx.clone()), (sale("SP", -1), ctx)];
    let out = explode_order("SO-C", &lines, &movements, &WarehouseCodeMap::default());

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].quantity, 1);
    assert_eq!(out[0].movement_id.as_deref(), Some("out"));
    assert_eq!(out[1].quantity, -1);
    assert_eq!(out[1].movement_id.as_deref(), Some("in"));
}

#[test]
fn card_split_without_equal_quantity_stays_unmatched() {
    let movements = vec![mv("m1", "MAT", 2, "K1")];
    let ctx = LineContext {
        material_code: Some("MAT".to_string()),
        card_split: true,
    };
    let lines = explode(&sale("SP", 1), &ctx, &movements, &WarehouseCodeMap::default());
    assert_eq!(lines.len(), 1);
    assert!(!lines[0].is_matched());
    assert_eq!(lines[0].quantity, 1);
}

#[test]
fn warehouse_codes_are_translated() {
    let map: WarehouseCodeMap = [("K1".to_string(), "WH-HCM".to_string())]
        .into_iter()
        .collect();
    let movements = vec![mv("m1", "MAT", 1, "K1"), mv("m2", "MAT", 1, "K7")];
    let ctx = LineContext {
        material_code: Some("MAT".to_string()),
        card_split: false,
    };
    let lines = explode(&sale("SP", 2), &ctx, &movements, &map);
    assert_eq!(lines[0].warehouse_code.as_deref(), Some("WH-HCM"));
    assert_eq!(lines[1].warehouse_code.as_deref(), Some("K7"));
}

#[test]
fn map_deserializes_from_plain_yaml_object() {
    let map: WarehouseCodeMap =
        serde_json::from_value(serde_json::json!({"KHO-A": "WH01"})).unwrap();
    assert_eq!(map.translate("KHO-A"), "WH01");
    assert_eq!(map.translate("KHO-B"), "KHO-B");
}
