//! Unit price / subtotal reconciliation.

use serde::{Deserialize, Serialize};
use slx_schemas::CanonicalSale;

use crate::classify::OrderCategory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub unit_price: i64,
    pub subtotal: i64,
}

/// Subtotal from, in order: explicit subtotal, line total, revenue,
/// price × quantity. Zero values count as absent.
pub(crate) fn reconcile_price(sale: &CanonicalSale, category: OrderCategory) -> Pricing {
    let subtotal = sale
        .subtotal
        .filter(|v| *v != 0)
        .or(sale.line_total.filter(|v| *v != 0))
        .or((sale.revenue != 0).then_some(sale.revenue))
        .unwrap_or_else(|| sale.unit_price.saturating_mul(sale.quantity));

    let unit_price = if category.recomputes_price() && sale.unit_price == 0 && sale.quantity != 0 {
        let gross = subtotal.saturating_add(sale.amounts.total_discounts());
        div_round(gross, sale.quantity)
    } else {
        sale.unit_price
    };

    Pricing {
        unit_price,
        subtotal,
    }
}

/// Integer division rounding half away from zero. Saturates on the single
/// overflowing quotient (`i64::MIN / -1`); a zero divisor yields 0.
fn div_round(n: i64, d: i64) -> i64 {
    if d == 0 {
        return 0;
    }
    let Some(q) = n.checked_div(d) else {
        return i64::MAX;
    };
    let r = n.checked_rem(d).unwrap_or(0);
    if r != 0 && 2 * r.unsigned_abs() >= d.unsigned_abs() {
        if (n < 0) == (d < 0) {
            q + 1
        } else {
            q - 1
        }
    } else {
        q
    }
}
