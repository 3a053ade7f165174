//! Promotion code (`code01`) and gift code resolution.

use serde::{Deserialize, Serialize};
use slx_schemas::{CanonicalSale, ProductInfo};

use crate::classify::OrderCategory;
use crate::tables::RuleTables;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCodes {
    pub code01: Option<String>,
    pub gift_code: Option<String>,
    /// `code01` came from a prefix rewrite and skipped the suffix rules.
    pub pre_derived: bool,
}

impl PromotionCodes {
    /// Every code that must be known to the promotion directory.
    pub fn referenced(&self) -> impl Iterator<Item = &str> {
        self.code01.iter().chain(self.gift_code.iter()).map(String::as_str)
    }
}

/// Cut at the first `-`, then strip one trailing `.I` / `.S` / `.V`.
pub fn truncate_promotion_code(code: &str) -> String {
    let head = code.split('-').next().unwrap_or(code).trim();
    [".I", ".S", ".V"]
        .iter()
        .find_map(|sfx| head.strip_suffix(sfx))
        .unwrap_or(head)
        .to_string()
}

fn rewrite_prefix(code: &str, tables: &RuleTables) -> Option<String> {
    tables.prefix_rewrites.iter().find_map(|rw| {
        code.strip_prefix(rw.from.as_str())
            .map(|rest| format!("{}{}", rw.to, rest))
    })
}

pub(crate) fn resolve_promotion(
    sale: &CanonicalSale,
    product: &ProductInfo,
    category: OrderCategory,
    brand: &str,
    is_marketplace: bool,
    tables: &RuleTables,
) -> PromotionCodes {
    if category == OrderCategory::PointExchange {
        return PromotionCodes {
            code01: None,
            gift_code: tables.point_gift_codes.get(&sale.branch_code).cloned(),
            pre_derived: false,
        };
    }

    let promo = sale
        .promotion_code
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let rewritten = promo.and_then(|p| rewrite_prefix(p, tables));
    let pre_derived = rewritten.is_some();

    let gift_code = if !sale.is_gift {
        None
    } else if category == OrderCategory::DealerTransfer {
        Some(dealer_gift_code(product, tables))
    } else {
        promo.map(truncate_promotion_code)
    };

    let code01 = if is_marketplace {
        Some(tables.marketplace_code(brand).to_string())
    } else if let Some(code) = rewritten {
        Some(code)
    } else {
        promo.map(|p| {
            let truncated = truncate_promotion_code(p);
            if tables.is_employee_discount(&truncated) {
                truncated
            } else {
                format!("{}{}", truncated, product.product_type.suffix())
            }
        })
    };

    PromotionCodes {
        code01,
        gift_code,
        pre_derived,
    }
}

fn dealer_gift_code(product: &ProductInfo, tables: &RuleTables) -> String {
    let rule = &tables.dealer_gift_codes;
    let in_set = product
        .sub_category
        .as_deref()
        .is_some_and(|sc| rule.sub_categories.iter().any(|s| s.eq_ignore_ascii_case(sc)));
    if in_set {
        rule.code_in_set.clone()
    } else {
        rule.code_otherwise.clone()
    }
}
