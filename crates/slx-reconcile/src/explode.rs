use slx_schemas::{CanonicalSale, MovementKind, PostingLine, WarehouseMovement};
use std::collections::BTreeMap;

use crate::{LineContext, TransferLine, TransferRequest, WarehouseCodeMap};

// ---------------------------------------------------------------------------
// Movement pool
// ---------------------------------------------------------------------------

/// Remaining unallocated magnitude per movement, shared by every line of an
/// order so two lines never claim the same stock twice.
#[derive(Debug, Clone)]
pub struct MovementPool<'a> {
    movements: Vec<&'a WarehouseMovement>,
    remaining: Vec<i64>,
}

impl<'a> MovementPool<'a> {
    /// Non-transfer movements of `order_code`, in feed order.
    pub fn for_order(order_code: &str, movements: &'a [WarehouseMovement]) -> Self {
        let movements: Vec<&WarehouseMovement> = movements
            .iter()
            .filter(|m| m.order_code == order_code && m.kind != MovementKind::Transfer)
            .collect();
        let remaining = movements.iter().map(|m| m.quantity.abs()).collect();
        Self {
            movements,
            remaining,
        }
    }

    /// Total magnitude not yet allocated.
    pub fn unallocated(&self) -> i64 {
        self.remaining.iter().sum()
    }

    fn candidates(&self, code: &str, exact_qty: Option<i64>) -> Vec<usize> {
        (0..self.movements.len())
            .filter(|&i| self.remaining[i] > 0)
            .filter(|&i| self.movements[i].material_code == code)
            .filter(|&i| exact_qty.map_or(true, |q| self.movements[i].quantity == q))
            .collect()
    }

    /// Material-code match first, raw item code as fallback.
    fn match_line(&self, sale: &CanonicalSale, ctx: &LineContext) -> Vec<usize> {
        let exact_qty = ctx.card_split.then_some(sale.quantity);
        let by_material = ctx
            .material_code
            .as_deref()
            .map(|code| self.candidates(code, exact_qty))
            .unwrap_or_default();
        if !by_material.is_empty() {
            return by_material;
        }
        self.candidates(&sale.item_code, exact_qty)
    }
}

// ---------------------------------------------------------------------------
// Explosion
// ---------------------------------------------------------------------------

/// Explode one sale against the movements of its order.
pub fn explode(
    sale: &CanonicalSale,
    ctx: &LineContext,
    movements: &[WarehouseMovement],
    map: &WarehouseCodeMap,
) -> Vec<PostingLine> {
    let mut pool = MovementPool::for_order(&sale.order_code, movements);
    explode_from_pool(sale, ctx, &mut pool, map)
}

/// Explode every line of one order against a shared pool. Output preserves
/// line order.
pub fn explode_order(
    order_code: &str,
    lines: &[(CanonicalSale, LineContext)],
    movements: &[WarehouseMovement],
    map: &WarehouseCodeMap,
) -> Vec<PostingLine> {
    let mut pool = MovementPool::for_order(order_code, movements);
    lines
        .iter()
        .flat_map(|(sale, ctx)| explode_from_pool(sale, ctx, &mut pool, map))
        .collect()
}

fn explode_from_pool(
    sale: &CanonicalSale,
    ctx: &LineContext,
    pool: &mut MovementPool<'_>,
    map: &WarehouseCodeMap,
) -> Vec<PostingLine> {
    let sign = if sale.quantity < 0 { -1 } else { 1 };
    let mut left = sale.quantity.abs();
    let mut out = Vec::new();

    if left > 0 {
        let candidates = pool.match_line(sale, ctx);
        let candidates = if ctx.card_split {
            candidates.into_iter().take(1).collect()
        } else {
            candidates
        };
        for i in candidates {
            if left == 0 {
                break;
            }
            let take = left.min(pool.remaining[i]);
            pool.remaining[i] -= take;
            left -= take;
            out.push(matched_line(sale, pool.movements[i], take * sign, map));
        }
    }

    if out.is_empty() {
        return vec![unmatched_line(sale, ctx, sale.quantity)];
    }
    if left > 0 {
        out.push(unmatched_line(sale, ctx, left * sign));
    }
    out
}

fn matched_line(
    sale: &CanonicalSale,
    mv: &WarehouseMovement,
    quantity: i64,
    map: &WarehouseCodeMap,
) -> PostingLine {
    PostingLine {
        natural_key: sale.natural_key.clone(),
        order_code: sale.order_code.clone(),
        item_code: sale.item_code.clone(),
        material_code: mv.material_code.clone(),
        quantity,
        warehouse_code: Some(map.translate(&mv.warehouse_code)),
        batch: mv.batch.clone(),
        serial: mv.serial.clone().or_else(|| sale.serial.clone()),
        movement_id: Some(mv.movement_id.clone()),
    }
}

fn unmatched_line(sale: &CanonicalSale, ctx: &LineContext, quantity: i64) -> PostingLine {
    PostingLine {
        natural_key: sale.natural_key.clone(),
        order_code: sale.order_code.clone(),
        item_code: sale.item_code.clone(),
        material_code: ctx
            .material_code
            .clone()
            .unwrap_or_else(|| sale.item_code.clone()),
        quantity,
        warehouse_code: None,
        batch: None,
        serial: sale.serial.clone(),
        movement_id: None,
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Group transfer movements by order code. Orders sort ascending; lines keep
/// feed order.
pub fn group_transfers(
    movements: &[WarehouseMovement],
    map: &WarehouseCodeMap,
) -> Vec<TransferRequest> {
    let mut by_order: BTreeMap<&str, Vec<TransferLine>> = BTreeMap::new();
    for m in movements.iter().filter(|m| m.kind == MovementKind::Transfer) {
        by_order
            .entry(m.order_code.as_str())
            .or_default()
            .push(TransferLine {
                movement_id: m.movement_id.clone(),
                material_code: m.material_code.clone(),
                quantity: m.quantity,
                batch: m.batch.clone(),
                serial: m.serial.clone(),
                from_warehouse: map.translate(&m.warehouse_code),
                to_warehouse: m.related_warehouse_code.as_deref().map(|c| map.translate(c)),
            });
    }
    by_order
        .into_iter()
        .map(|(order_code, lines)| TransferRequest {
            order_code: order_code.to_string(),
            lines,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(id: &str, order: &str, material: &str, qty: i64, kind: MovementKind) -> WarehouseMovement {
        WarehouseMovement {
            movement_id: id.to_string(),
            order_code: order.to_string(),
            material_code: material.to_string(),
            quantity: qty,
            batch: None,
            serial: None,
            kind,
            warehouse_code: "K1".to_string(),
            related_warehouse_code: Some("K2".to_string()),
        }
    }

    #[test]
    fn pool_ignores_other_orders_and_transfers() {
        let mvs = vec![
            mv("1", "A", "M", 3, MovementKind::Out),
            mv("2", "B", "M", 5, MovementKind::Out),
            mv("3", "A", "M", 7, MovementKind::Transfer),
            mv("4", "A", "M", -2, MovementKind::In),
        ];
        let pool = MovementPool::for_order("A", &mvs);
        assert_eq!(pool.unallocated(), 5);
    }

    #[test]
    fn transfers_group_per_order_with_mapped_codes() {
        let mvs = vec![
            mv("t2", "B", "M1", 1, MovementKind::Transfer),
            mv("t1", "A", "M1", 2, MovementKind::Transfer),
            mv("o1", "A", "M2", 2, MovementKind::Out),
            mv("t3", "A", "M2", 4, MovementKind::Transfer),
        ];
        let map: WarehouseCodeMap = [("K1".to_string(), "WH-01".to_string())]
            .into_iter()
            .collect();
        let reqs = group_transfers(&mvs, &map);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].order_code, "A");
        let ids: Vec<_> = reqs[0].lines.iter().map(|l| l.movement_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        assert_eq!(reqs[0].lines[0].from_warehouse, "WH-01");
        assert_eq!(reqs[0].lines[0].to_warehouse.as_deref(), Some("K2"));
    }
}
