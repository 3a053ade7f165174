//! slx-schemas
//!
//! Shared data model for sales ingestion, stock reconciliation and ledger
//! posting. Plain data only: no IO, no business rules.
//!
//! Money is carried as integer minor units (`i64`). Quantities are signed
//! integers; a negative quantity is a return or the reversing half of a
//! card-split order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Sale amounts
// ---------------------------------------------------------------------------

/// A pass-through amount carried under an upstream field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmount {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub amount: i64,
}

/// Discount and voucher amounts reported for one sale line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleAmounts {
    /// Purchase discount.
    pub disc_amt: i64,
    /// Membership (VIP tier) discount.
    pub grade_disc_amt: i64,
    /// Discounts not classified by the source feed.
    pub other_disc_amt: i64,
    /// Wholesale policy discount.
    pub dist_tm: i64,
    pub coupon_amt: i64,
    /// Payment instrument amount allocated to the line (voucher or e-wallet credit).
    pub voucher_amt: i64,
    pub voucher2_amt: i64,
    pub voucher3_amt: i64,
    pub voucher4_amt: i64,
    pub marketplace_voucher_amt: i64,
    /// Pass-through amounts keyed by upstream field name (`ck09` .. `ck22`).
    pub extra: BTreeMap<String, LineAmount>,
}

impl SaleAmounts {
    /// Sum of every discount and voucher amount on the line.
    pub fn total_discounts(&self) -> i64 {
        let named = [
            self.disc_amt,
            self.grade_disc_amt,
            self.other_disc_amt,
            self.dist_tm,
            self.coupon_amt,
            self.voucher_amt,
            self.voucher2_amt,
            self.voucher3_amt,
            self.voucher4_amt,
            self.marketplace_voucher_amt,
        ];
        named
            .iter()
            .copied()
            .chain(self.extra.values().map(|a| a.amount))
            .fold(0, i64::saturating_add)
    }

    pub fn extra_amount(&self, field: &str) -> Option<&LineAmount> {
        self.extra.get(field)
    }
}

// ---------------------------------------------------------------------------
// Raw + canonical sale lines
// ---------------------------------------------------------------------------

/// One sale line exactly as reported by a channel feed. Read once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSaleEvent {
    /// Feed the event came from (e.g. `pos`, `web`, `wholesale`).
    pub source: String,
    #[serde(default)]
    pub source_native_id: Option<String>,
    /// Position of the line inside its order as reported by the feed.
    #[serde(default)]
    pub position_index: u32,
    #[serde(default)]
    pub order_code: Option<String>,
    pub order_date: NaiveDate,
    pub branch_code: String,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub category_tags: Vec<String>,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: i64,
    #[serde(default)]
    pub revenue: i64,
    #[serde(default)]
    pub subtotal: Option<i64>,
    #[serde(default)]
    pub line_total: Option<i64>,
    #[serde(default)]
    pub amounts: SaleAmounts,
    /// Free-text order-type label supplied by the channel.
    #[serde(default)]
    pub order_type_label: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub is_wholesale: bool,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub is_marketplace: bool,
    #[serde(default)]
    pub is_cancellation: bool,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub channel_code: Option<String>,
    /// VAT rate in whole percent.
    #[serde(default)]
    pub tax_rate: Option<u32>,
    #[serde(default)]
    pub discount_account: Option<String>,
    #[serde(default)]
    pub expense_account: Option<String>,
    #[serde(default)]
    pub fee_code: Option<String>,
}

/// Descriptive attributes of a sale that a re-ingestion may overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDescriptive {
    pub item_name: Option<String>,
    pub category_tags: Vec<String>,
    pub customer_name: Option<String>,
}

/// Deduplicated, persisted sale line.
///
/// `natural_key` is unique across the store. Key fields never change after
/// insertion; `posted` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSale {
    pub natural_key: String,
    pub source: String,
    pub source_native_id: Option<String>,
    pub position_index: u32,
    pub order_code: String,
    pub order_date: NaiveDate,
    pub branch_code: String,
    pub item_code: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub revenue: i64,
    pub subtotal: Option<i64>,
    pub line_total: Option<i64>,
    pub amounts: SaleAmounts,
    pub order_type_label: String,
    pub brand: String,
    pub is_wholesale: bool,
    pub is_gift: bool,
    pub is_marketplace: bool,
    pub is_cancellation: bool,
    pub promotion_code: Option<String>,
    pub serial: Option<String>,
    pub customer_id: String,
    pub channel_code: Option<String>,
    pub tax_rate: Option<u32>,
    pub discount_account: Option<String>,
    pub expense_account: Option<String>,
    pub fee_code: Option<String>,
    pub descriptive: SaleDescriptive,
    pub posted: bool,
}

// ---------------------------------------------------------------------------
// Warehouse movements + posting lines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    In,
    Out,
    Transfer,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Transfer => "TRANSFER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(MovementKind::In),
            "OUT" => Some(MovementKind::Out),
            "TRANSFER" => Some(MovementKind::Transfer),
            _ => None,
        }
    }
}

/// Stock movement reported independently by the warehouse feed. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseMovement {
    pub movement_id: String,
    pub order_code: String,
    pub material_code: String,
    /// Signed quantity as reported by the warehouse.
    pub quantity: i64,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    pub kind: MovementKind,
    pub warehouse_code: String,
    /// Destination for transfers, counterpart warehouse otherwise.
    #[serde(default)]
    pub related_warehouse_code: Option<String>,
}

/// One ledger line produced by exploding a sale against its movements.
/// In-memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLine {
    pub natural_key: String,
    pub order_code: String,
    pub item_code: String,
    pub material_code: String,
    pub quantity: i64,
    /// Ledger warehouse code after mapping; `None` when no movement matched.
    pub warehouse_code: Option<String>,
    pub batch: Option<String>,
    pub serial: Option<String>,
    pub movement_id: Option<String>,
}

impl PostingLine {
    pub fn is_matched(&self) -> bool {
        self.movement_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// Collaborator lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Goods,
    Service,
    Voucher,
}

impl ProductType {
    /// Single-letter ledger code (`I`, `S`, `V`).
    pub fn letter(&self) -> &'static str {
        match self {
            ProductType::Goods => "I",
            ProductType::Service => "S",
            ProductType::Voucher => "V",
        }
    }

    /// Promotion-code suffix for this product type.
    pub fn suffix(&self) -> &'static str {
        match self {
            ProductType::Goods => ".I",
            ProductType::Service => ".S",
            ProductType::Voucher => ".V",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" | "GOODS" => Some(ProductType::Goods),
            "S" | "SERVICE" => Some(ProductType::Service),
            "V" | "VOUCHER" => Some(ProductType::Voucher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Cosmetics,
    Supplements,
    DurableGoods,
    Other,
}

impl ProductCategory {
    /// Short ledger code used inside promotion codes.
    pub fn code(&self) -> &'static str {
        match self {
            ProductCategory::Cosmetics => "MP",
            ProductCategory::Supplements => "TPCN",
            ProductCategory::DurableGoods => "TBLB",
            ProductCategory::Other => "KHAC",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP" | "COSMETICS" => ProductCategory::Cosmetics,
            "TPCN" | "SUPPLEMENTS" => ProductCategory::Supplements,
            "TBLB" | "DURABLE_GOODS" => ProductCategory::DurableGoods,
            _ => ProductCategory::Other,
        }
    }
}

/// Catalog entry for a material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub material_code: String,
    pub unit: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub track_batch: bool,
    #[serde(default)]
    pub track_serial: bool,
    pub category: ProductCategory,
    #[serde(default)]
    pub sub_category: Option<String>,
    /// Electronic-code (voucher-type) material.
    #[serde(default)]
    pub is_ecode: bool,
}

/// Ledger identity of a retail branch. Either code may be unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub ledger_company_code: Option<String>,
    pub ledger_branch_code: Option<String>,
}

/// Promotion directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionInfo {
    pub discount_account: Option<String>,
    pub expense_account: Option<String>,
    pub fee_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Order-level records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    EWalletCredit,
    Voucher,
    Other,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::EWalletCredit => "e_wallet_credit",
            PaymentKind::Voucher => "voucher",
            PaymentKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "e_wallet_credit" => Some(PaymentKind::EWalletCredit),
            "voucher" => Some(PaymentKind::Voucher),
            "other" => Some(PaymentKind::Other),
            _ => None,
        }
    }
}

/// Payment-method record reported for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayment {
    pub order_code: String,
    pub method_code: String,
    pub kind: PaymentKind,
    pub amount: i64,
}

/// Companion fee record (marketplace commission, shipping fee, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFee {
    pub order_code: String,
    pub fee_code: String,
    pub amount: i64,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Duplicate,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Duplicate => "DUPLICATE",
            AuditStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(AuditStatus::Success),
            "DUPLICATE" => Some(AuditStatus::Duplicate),
            "ERROR" => Some(AuditStatus::Error),
            _ => None,
        }
    }
}

/// One row per external ledger call. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub order_code: String,
    pub step: String,
    pub request_payload: Value,
    pub response_payload: Value,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}
