//! Raw sale event -> canonical sale.
//!
//! The natural key is derived from business fields only: no timestamps, no
//! generated ids. Re-ingesting the same logical event always produces the
//! same key.

use std::fmt;

use slx_schemas::{CanonicalSale, RawSaleEvent, SaleDescriptive};

/// Separator between natural-key components.
pub const KEY_SEPARATOR: char = '|';

/// Placeholder for absent optional key components.
const NULL_COMPONENT: &str = "null";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    MissingOrderCode { source: String, position_index: u32 },
    MissingItemCode { order_code: String, position_index: u32 },
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::MissingOrderCode {
                source,
                position_index,
            } => write!(
                f,
                "sale event from '{source}' at position {position_index} has no order code"
            ),
            NormalizeError::MissingItemCode {
                order_code,
                position_index,
            } => write!(
                f,
                "sale line {position_index} of order '{order_code}' has no item code"
            ),
        }
    }
}

impl std::error::Error for NormalizeError {}

// ---------------------------------------------------------------------------
// Key + canonicalization
// ---------------------------------------------------------------------------

fn required(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn optional_component(v: &Option<String>) -> String {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| NULL_COMPONENT.to_string(), escape_component)
}

/// Backslash-escapes `\` and the separator so no two component lists join to
/// the same key.
fn escape_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == KEY_SEPARATOR {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Ordered key tuple:
/// `(orderCode, itemCode, qty, unitPrice, discAmt, gradeDiscAmt, otherDiscAmt,
/// revenue, promoCode|null, serial|null, customerId, sourceNativeId|null,
/// positionIndex)`.
pub fn natural_key(ev: &RawSaleEvent) -> Result<String, NormalizeError> {
    let order_code = required(&ev.order_code).ok_or_else(|| NormalizeError::MissingOrderCode {
        source: ev.source.clone(),
        position_index: ev.position_index,
    })?;
    let item_code = required(&ev.item_code).ok_or_else(|| NormalizeError::MissingItemCode {
        order_code: order_code.to_string(),
        position_index: ev.position_index,
    })?;

    let parts = [
        escape_component(order_code),
        escape_component(item_code),
        ev.quantity.to_string(),
        ev.unit_price.to_string(),
        ev.amounts.disc_amt.to_string(),
        ev.amounts.grade_disc_amt.to_string(),
        ev.amounts.other_disc_amt.to_string(),
        ev.revenue.to_string(),
        optional_component(&ev.promotion_code),
        optional_component(&ev.serial),
        escape_component(ev.customer_id.trim()),
        optional_component(&ev.source_native_id),
        ev.position_index.to_string(),
    ];
    Ok(parts.join(&KEY_SEPARATOR.to_string()))
}

/// Validate and convert. New sales start with `posted = false`.
pub fn canonicalize(ev: &RawSaleEvent) -> Result<CanonicalSale, NormalizeError> {
    let natural_key = natural_key(ev)?;
    // natural_key already validated both codes.
    let order_code = required(&ev.order_code).unwrap_or_default().to_string();
    let item_code = required(&ev.item_code).unwrap_or_default().to_string();

    Ok(CanonicalSale {
        natural_key,
        source: ev.source.clone(),
        source_native_id: ev.source_native_id.clone(),
        position_index: ev.position_index,
        order_code,
        order_date: ev.order_date,
        branch_code: ev.branch_code.trim().to_string(),
        item_code,
        quantity: ev.quantity,
        unit_price: ev.unit_price,
        revenue: ev.revenue,
        subtotal: ev.subtotal,
        line_total: ev.line_total,
        amounts: ev.amounts.clone(),
        order_type_label: ev.order_type_label.clone(),
        brand: ev.brand.clone(),
        is_wholesale: ev.is_wholesale,
        is_gift: ev.is_gift,
        is_marketplace: ev.is_marketplace,
        is_cancellation: ev.is_cancellation,
        promotion_code: ev.promotion_code.clone(),
        serial: ev.serial.clone(),
        customer_id: ev.customer_id.trim().to_string(),
        channel_code: ev.channel_code.clone(),
        tax_rate: ev.tax_rate,
        discount_account: ev.discount_account.clone(),
        expense_account: ev.expense_account.clone(),
        fee_code: ev.fee_code.clone(),
        descriptive: SaleDescriptive {
            item_name: ev.item_name.clone(),
            category_tags: ev.category_tags.clone(),
            customer_name: ev.customer_name.clone(),
        },
        posted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use slx_schemas::SaleAmounts;

    fn raw() -> RawSaleEvent {
        RawSaleEvent {
            source: "pos".to_string(),
            source_native_id: Some("N-1".to_string()),
            position_index: 2,
            order_code: Some(" SO-1 ".to_string()),
            order_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            branch_code: "HCM01".to_string(),
            item_code: Some("SP01".to_string()),
            item_name: Some("Serum".to_string()),
            category_tags: vec![],
            quantity: 3,
            unit_price: 100,
            revenue: 270,
            subtotal: None,
            line_total: None,
            amounts: SaleAmounts {
                disc_amt: 30,
                ..Default::default()
            },
            order_type_label: "01.Thường".to_string(),
            brand: "ACME".to_string(),
            is_wholesale: false,
            is_gift: false,
            is_marketplace: false,
            is_cancellation: false,
            promotion_code: None,
            serial: Some(String::new()),
            customer_id: "C9".to_string(),
            customer_name: None,
            channel_code: None,
            tax_rate: None,
            discount_account: None,
            expense_account: None,
            fee_code: None,
        }
    }

    #[test]
    fn key_layout_is_fixed() {
        assert_eq!(
            natural_key(&raw()).unwrap(),
            "SO-1|SP01|3|100|30|0|0|270|null|null|C9|N-1|2"
        );
    }

    #[test]
    fn descriptive_fields_do_not_affect_key() {
        let a = raw();
        let mut b = raw();
        b.item_name = Some("Renamed".to_string());
        b.category_tags = vec!["skin".to_string()];
        b.customer_name = Some("Lan".to_string());
        assert_eq!(natural_key(&a).unwrap(), natural_key(&b).unwrap());
    }

    #[test]
    fn position_index_distinguishes_identical_lines() {
        let a = raw();
        let mut b = raw();
        b.position_index = 3;
        assert_ne!(natural_key(&a).unwrap(), natural_key(&b).unwrap());
    }

    #[test]
    fn separator_inside_codes_cannot_collide() {
        let mut a = raw();
        a.order_code = Some("A|B".to_string());
        a.item_code = Some("C".to_string());
        let mut b = raw();
        b.order_code = Some("A".to_string());
        b.item_code = Some("B|C".to_string());
        let (ka, kb) = (natural_key(&a).unwrap(), natural_key(&b).unwrap());
        assert_ne!(ka, kb);
        assert!(ka.starts_with("A\\|B|C|"));
    }

    #[test]
    fn blank_codes_are_malformed() {
        let mut ev = raw();
        ev.item_code = Some("  ".to_string());
        assert!(matches!(
            canonicalize(&ev),
            Err(NormalizeError::MissingItemCode { .. })
        ));
        ev.order_code = None;
        assert!(matches!(
            canonicalize(&ev),
            Err(NormalizeError::MissingOrderCode { .. })
        ));
    }

    #[test]
    fn canonical_sale_starts_unposted_with_trimmed_codes() {
        let s = canonicalize(&raw()).unwrap();
        assert_eq!(s.order_code, "SO-1");
        assert!(!s.posted);
        assert_eq!(s.descriptive.item_name.as_deref(), Some("Serum"));
    }
}
