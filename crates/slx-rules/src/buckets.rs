//! The 22 positional discount buckets (`ck01`..`ck22`).
//!
//! Slot semantics are fixed:
//!
//! | slot | meaning |
//! |------|---------|
//! | 1 | purchase discount |
//! | 2 | policy discount (wholesale code from category/ecode) |
//! | 3 | VIP-tier discount |
//! | 4 | coupon |
//! | 5 | voucher payment, exclusive with 11 |
//! | 6 | secondary voucher / marketplace voucher label |
//! | 7, 8 | further voucher tiers |
//! | 9..=22 | pass-through by field name; 11 = e-wallet, 15 = marketplace voucher |

use serde::{Deserialize, Serialize};
use slx_schemas::{CanonicalSale, OrderPayment, PaymentKind, ProductInfo};

use crate::classify::OrderCategory;
use crate::tables::RuleTables;

pub const BUCKET_COUNT: usize = 22;

/// Code placed on a bucket that is deliberately zeroed.
pub const FORCED_ZERO_CODE: &str = "-";

pub const SLOT_PURCHASE: usize = 1;
pub const SLOT_POLICY: usize = 2;
pub const SLOT_VIP: usize = 3;
pub const SLOT_COUPON: usize = 4;
pub const SLOT_VOUCHER: usize = 5;
pub const SLOT_VOUCHER2: usize = 6;
pub const SLOT_VOUCHER3: usize = 7;
pub const SLOT_VOUCHER4: usize = 8;
pub const SLOT_EWALLET: usize = 11;
pub const SLOT_MARKETPLACE_VOUCHER: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBucket {
    pub code: String,
    pub amount: i64,
}

impl DiscountBucket {
    pub fn new(code: impl Into<String>, amount: i64) -> Self {
        Self {
            code: code.into(),
            amount,
        }
    }

    pub fn forced_zero() -> Self {
        Self::new(FORCED_ZERO_CODE, 0)
    }

    pub fn is_forced_zero(&self) -> bool {
        self.code == FORCED_ZERO_CODE && self.amount == 0
    }
}

/// Fixed array of 22 optional buckets, addressed 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSet(Vec<Option<DiscountBucket>>);

impl Default for BucketSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl BucketSet {
    pub fn empty() -> Self {
        Self(vec![None; BUCKET_COUNT])
    }

    fn from_fn(f: impl FnMut(usize) -> Option<DiscountBucket>) -> Self {
        Self((1..=BUCKET_COUNT).map(f).collect())
    }

    /// Bucket at 1-based `slot`; `None` for empty or out-of-range slots.
    pub fn get(&self, slot: usize) -> Option<&DiscountBucket> {
        slot.checked_sub(1)
            .and_then(|i| self.0.get(i))
            .and_then(Option::as_ref)
    }

    /// Amount at `slot`, zero when empty.
    pub fn amount(&self, slot: usize) -> i64 {
        self.get(slot).map(|b| b.amount).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// `(slot, bucket)` for every occupied slot, ascending.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &DiscountBucket)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (i + 1, b)))
    }

    /// Sum of bucket amounts, saturating.
    pub fn total(&self) -> i64 {
        self.occupied().map(|(_, b)| b.amount).fold(0, i64::saturating_add)
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Which payment instrument the order's payment records report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// E-wallet credit present. Wins over a voucher record.
    EWallet,
    Voucher,
    /// Neither reported: fall back to the sale's own amounts.
    Unreported,
}

impl PaymentMode {
    pub fn from_payments(payments: &[OrderPayment]) -> Self {
        if payments.iter().any(|p| p.kind == PaymentKind::EWalletCredit) {
            PaymentMode::EWallet
        } else if payments.iter().any(|p| p.kind == PaymentKind::Voucher) {
            PaymentMode::Voucher
        } else {
            PaymentMode::Unreported
        }
    }
}

pub(crate) struct BucketInput<'a> {
    pub sale: &'a CanonicalSale,
    pub product: &'a ProductInfo,
    pub brand: &'a str,
    pub category: OrderCategory,
    pub is_wholesale: bool,
    pub is_marketplace: bool,
    pub payment_mode: PaymentMode,
    pub code01: Option<&'a str>,
}

/// Build all 22 buckets for one line.
pub(crate) fn assign_buckets(inp: &BucketInput<'_>, tables: &RuleTables) -> BucketSet {
    if inp.category == OrderCategory::PromotionalShipment {
        return BucketSet::empty();
    }
    BucketSet::from_fn(|slot| bucket_for(slot, inp, tables))
}

fn non_zero(code: impl Into<String>, amount: i64) -> Option<DiscountBucket> {
    (amount != 0).then(|| DiscountBucket::new(code, amount))
}

fn bucket_for(slot: usize, inp: &BucketInput<'_>, tables: &RuleTables) -> Option<DiscountBucket> {
    let a = &inp.sale.amounts;
    let codes = &tables.bucket_codes;
    let point_exchange = inp.category == OrderCategory::PointExchange;
    let marketplace_voucher = inp.is_marketplace && a.marketplace_voucher_amt != 0;

    match slot {
        SLOT_PURCHASE => {
            if point_exchange {
                Some(DiscountBucket::forced_zero())
            } else {
                let code = inp.code01.unwrap_or(&codes.purchase_discount);
                non_zero(code, a.disc_amt)
            }
        }
        SLOT_POLICY => {
            let code = if inp.is_wholesale {
                tables.wholesale_policy_code(inp.product.category, inp.product.is_ecode)
            } else {
                codes.retail_policy.clone()
            };
            non_zero(code, a.dist_tm)
        }
        SLOT_VIP => {
            let code = tables
                .vip_code(inp.brand, inp.product.product_type)
                .unwrap_or(&codes.purchase_discount);
            non_zero(code, a.grade_disc_amt)
        }
        SLOT_COUPON => non_zero(&codes.coupon, a.coupon_amt),
        SLOT_VOUCHER => {
            if point_exchange {
                return None;
            }
            match inp.payment_mode {
                PaymentMode::EWallet => Some(DiscountBucket::forced_zero()),
                PaymentMode::Voucher if inp.is_wholesale || inp.is_marketplace => {
                    Some(DiscountBucket::forced_zero())
                }
                _ if marketplace_voucher => None,
                PaymentMode::Voucher | PaymentMode::Unreported => {
                    non_zero(&codes.voucher, a.voucher_amt)
                }
            }
        }
        SLOT_VOUCHER2 => {
            let code = if marketplace_voucher {
                &codes.marketplace_voucher_label
            } else {
                &codes.voucher2
            };
            non_zero(code, a.voucher2_amt)
        }
        SLOT_VOUCHER3 => non_zero(&codes.voucher3, a.voucher3_amt),
        SLOT_VOUCHER4 => non_zero(&codes.voucher4, a.voucher4_amt),
        SLOT_EWALLET => match inp.payment_mode {
            PaymentMode::EWallet => non_zero(tables.ewallet_code(inp.brand), a.voucher_amt)
                .or_else(|| Some(DiscountBucket::forced_zero())),
            PaymentMode::Voucher => Some(DiscountBucket::forced_zero()),
            PaymentMode::Unreported => pass_through(slot, inp, tables)
                .map(|b| DiscountBucket::new(tables.ewallet_code(inp.brand), b.amount)),
        },
        SLOT_MARKETPLACE_VOUCHER if marketplace_voucher => {
            non_zero(&codes.marketplace_voucher, a.marketplace_voucher_amt)
        }
        _ => pass_through(slot, inp, tables),
    }
}

/// Pass-through slot: amount (and code, when supplied) from the sale's
/// extra amounts under the configured field name.
fn pass_through(slot: usize, inp: &BucketInput<'_>, tables: &RuleTables) -> Option<DiscountBucket> {
    let slot_key = u8::try_from(slot).ok()?;
    let field = tables.pass_through_fields.get(&slot_key)?;
    let extra = inp.sale.amounts.extra_amount(field)?;
    let code = extra
        .code
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| field.to_ascii_uppercase());
    non_zero(code, extra.amount)
}
