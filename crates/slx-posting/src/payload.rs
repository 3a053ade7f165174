//! Ledger payloads and order assembly.
//!
//! One order becomes: a customer upsert, a sales-order document (header +
//! `detail[]`), the same document submitted as an invoice, zero or more
//! payment receipts, an optional stock issue and one transfer per grouped
//! transfer request.
//!
//! A sale that explodes into several posting lines has its subtotal and
//! bucket amounts split across them by quantity. The last line absorbs the
//! rounding remainder so the split always sums to the original.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slx_reconcile::TransferRequest;
use slx_rules::{AccountingResolution, BucketSet, BUCKET_COUNT};
use slx_schemas::{
    BranchInfo, CanonicalSale, OrderPayment, PaymentKind, PostingLine, ProductInfo,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::settings::PipelineSettings;

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHeader {
    pub company_code: String,
    pub branch_code: Option<String>,
    pub customer_code: String,
    pub currency: String,
    pub fx_rate: f64,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub channel_code: Option<String>,
    pub transaction_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailLine {
    /// Natural key of the sale the line was exploded from.
    pub line_ref: String,
    pub material_code: String,
    pub unit: String,
    pub warehouse_code: Option<String>,
    pub batch: Option<String>,
    pub serial: Option<String>,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub tax_code: String,
    pub tax_amount: i64,
    pub discount_account: Option<String>,
    pub expense_account: Option<String>,
    pub fee_code: Option<String>,
    pub code01: Option<String>,
    pub gift_code: Option<String>,
    /// `discountCode01`..`discountCode22` and `discountAmount01`..`discountAmount22`.
    #[serde(flatten)]
    pub discounts: BTreeMap<String, Value>,
}

impl DetailLine {
    /// `(code, amount)` at 1-based `slot`.
    pub fn discount(&self, slot: usize) -> (Option<&str>, i64) {
        let code = self
            .discounts
            .get(&discount_code_key(slot))
            .and_then(Value::as_str);
        let amount = self
            .discounts
            .get(&discount_amount_key(slot))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        (code, amount)
    }

    pub fn discount_total(&self) -> i64 {
        (1..=BUCKET_COUNT).map(|s| self.discount(s).1).sum()
    }
}

/// Sales-order document. The invoice step submits the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOrderPayload {
    pub header: OrderHeader,
    pub detail: Vec<DetailLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    pub company_code: String,
    pub customer_code: String,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub company_code: String,
    pub customer_code: String,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub method_code: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub material_code: String,
    pub unit: String,
    pub warehouse_code: String,
    pub batch: Option<String>,
    pub serial: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockIssuePayload {
    pub company_code: String,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub lines: Vec<StockLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub company_code: String,
    pub document_date: NaiveDate,
    #[serde(flatten)]
    pub request: TransferRequest,
}

/// Everything the pipeline submits for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAssembly {
    pub customer: CustomerPayload,
    pub order: LedgerOrderPayload,
    /// Cash / bank receipts, not yet routed.
    pub payments: Vec<PaymentPayload>,
    /// `None` when no posting line resolved a warehouse code.
    pub stock_issue: Option<StockIssuePayload>,
    pub transfers: Vec<TransferPayload>,
    /// Promotion and gift codes the payload references.
    pub promotion_codes: BTreeSet<String>,
}

impl OrderAssembly {
    pub fn has_stock_work(&self) -> bool {
        self.stock_issue.is_some() || !self.transfers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    NoSales { order_code: String },
    MissingCompanyCode { branch_code: String },
    /// A posting line refers to a sale that was not resolved.
    UnresolvedLine { line_ref: String },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::NoSales { order_code } => {
                write!(f, "order '{order_code}' has no sale lines")
            }
            AssemblyError::MissingCompanyCode { branch_code } => {
                write!(f, "branch '{branch_code}' has no ledger company code")
            }
            AssemblyError::UnresolvedLine { line_ref } => {
                write!(f, "posting line '{line_ref}' has no resolved sale")
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

/// One sale with everything resolved for it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSale<'a> {
    pub sale: &'a CanonicalSale,
    pub product: &'a ProductInfo,
    pub resolution: &'a AccountingResolution,
}

#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub order_code: &'a str,
    pub branch: &'a BranchInfo,
    /// In line order.
    pub sales: &'a [ResolvedSale<'a>],
    pub posting_lines: &'a [PostingLine],
    pub transfers: &'a [TransferRequest],
    pub payments: &'a [OrderPayment],
    pub customer_name: Option<&'a str>,
    pub settings: &'a PipelineSettings,
}

pub fn discount_code_key(slot: usize) -> String {
    format!("discountCode{slot:02}")
}

pub fn discount_amount_key(slot: usize) -> String {
    format!("discountAmount{slot:02}")
}

/// Split `total` across `weights` proportionally; the last share takes the
/// remainder. All-zero weights put everything on the first share.
pub fn allocate(total: i64, weights: &[i64]) -> Vec<i64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let sum: i128 = weights.iter().map(|w| i128::from(w.abs())).sum();
    let mut out = vec![0i64; n];
    if sum == 0 {
        out[0] = total;
        return out;
    }
    let mut given = 0i64;
    for (i, w) in weights.iter().enumerate().take(n - 1) {
        let share = i128::from(total) * i128::from(w.abs()) / sum;
        out[i] = share as i64;
        given += out[i];
    }
    out[n - 1] = total - given;
    out
}

fn discount_fields(buckets: &BucketSet, shares: &[i64; BUCKET_COUNT]) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    for slot in 1..=BUCKET_COUNT {
        let code = buckets
            .get(slot)
            .map(|b| Value::String(b.code.clone()))
            .unwrap_or(Value::Null);
        fields.insert(discount_code_key(slot), code);
        fields.insert(discount_amount_key(slot), Value::from(shares[slot - 1]));
    }
    fields
}

fn tax_amount(net: i64, rate: Option<u32>) -> i64 {
    let rate = i128::from(rate.unwrap_or(0));
    let raw = i128::from(net) * rate;
    // Half away from zero.
    let q = (raw.abs() + 50) / 100;
    (if raw < 0 { -q } else { q }) as i64
}

/// Detail lines for one sale, one per posting line.
fn detail_for_sale(rs: &ResolvedSale<'_>, lines: &[&PostingLine]) -> Vec<DetailLine> {
    let weights: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
    let amounts = allocate(rs.resolution.pricing.subtotal, &weights);

    let mut bucket_shares = vec![[0i64; BUCKET_COUNT]; lines.len()];
    for (slot, bucket) in rs.resolution.buckets.occupied() {
        for (i, share) in allocate(bucket.amount, &weights).into_iter().enumerate() {
            bucket_shares[i][slot - 1] = share;
        }
    }

    let res = rs.resolution;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let discounts = discount_fields(&res.buckets, &bucket_shares[i]);
            let discount_total: i64 = bucket_shares[i].iter().sum();
            DetailLine {
                line_ref: line.natural_key.clone(),
                material_code: line.material_code.clone(),
                unit: rs.product.unit.clone(),
                warehouse_code: line.warehouse_code.clone(),
                batch: line.batch.clone(),
                serial: line.serial.clone(),
                quantity: line.quantity,
                unit_price: res.pricing.unit_price,
                amount: amounts[i],
                tax_code: res.tax_code.clone(),
                tax_amount: tax_amount(amounts[i] - discount_total, rs.sale.tax_rate),
                discount_account: res.accounts.discount_account.clone(),
                expense_account: res.accounts.expense_account.clone(),
                fee_code: res.accounts.fee_code.clone(),
                code01: res.promotion.code01.clone(),
                gift_code: res.promotion.gift_code.clone(),
                discounts,
            }
        })
        .collect()
}

pub fn assemble_order(input: &AssemblyInput<'_>) -> Result<OrderAssembly, AssemblyError> {
    let first = input.sales.first().ok_or_else(|| AssemblyError::NoSales {
        order_code: input.order_code.to_string(),
    })?;
    let company_code = input
        .branch
        .ledger_company_code
        .clone()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AssemblyError::MissingCompanyCode {
            branch_code: first.sale.branch_code.clone(),
        })?;

    let settings = input.settings;
    let document_date = first.sale.order_date;
    let customer_code = first.sale.customer_id.clone();

    // Posting lines grouped under the sale they came from.
    let mut by_sale: BTreeMap<&str, Vec<&PostingLine>> = BTreeMap::new();
    for line in input.posting_lines {
        if !input
            .sales
            .iter()
            .any(|rs| rs.sale.natural_key == line.natural_key)
        {
            return Err(AssemblyError::UnresolvedLine {
                line_ref: line.natural_key.clone(),
            });
        }
        by_sale.entry(line.natural_key.as_str()).or_default().push(line);
    }

    let mut detail = Vec::new();
    let mut stock_lines = Vec::new();
    let mut promotion_codes = BTreeSet::new();
    for rs in input.sales {
        promotion_codes.extend(rs.resolution.promotion.referenced().map(str::to_string));
        let Some(lines) = by_sale.get(rs.sale.natural_key.as_str()) else {
            continue;
        };
        for line in lines {
            if let Some(wh) = &line.warehouse_code {
                stock_lines.push(StockLine {
                    material_code: line.material_code.clone(),
                    unit: rs.product.unit.clone(),
                    warehouse_code: wh.clone(),
                    batch: line.batch.clone(),
                    serial: line.serial.clone(),
                    quantity: line.quantity,
                });
            }
        }
        detail.extend(detail_for_sale(rs, lines));
    }

    let header = OrderHeader {
        company_code: company_code.clone(),
        branch_code: input.branch.ledger_branch_code.clone(),
        customer_code: customer_code.clone(),
        currency: settings.currency.clone(),
        fx_rate: settings.fx_rate,
        document_number: input.order_code.to_string(),
        document_date,
        channel_code: first
            .sale
            .channel_code
            .clone()
            .or_else(|| settings.channel_code.clone()),
        transaction_type: first.resolution.transaction_type.clone(),
    };

    // E-wallet and voucher records settle through the discount buckets.
    let payments = input
        .payments
        .iter()
        .filter(|p| p.kind == PaymentKind::Other && p.amount != 0)
        .map(|p| PaymentPayload {
            company_code: company_code.clone(),
            customer_code: customer_code.clone(),
            document_number: input.order_code.to_string(),
            document_date,
            method_code: p.method_code.clone(),
            amount: p.amount,
            currency: settings.currency.clone(),
        })
        .collect();

    let stock_issue = (!stock_lines.is_empty()).then(|| StockIssuePayload {
        company_code: company_code.clone(),
        document_number: input.order_code.to_string(),
        document_date,
        lines: stock_lines,
    });

    let transfers = input
        .transfers
        .iter()
        .map(|t| TransferPayload {
            company_code: company_code.clone(),
            document_date,
            request: t.clone(),
        })
        .collect();

    Ok(OrderAssembly {
        customer: CustomerPayload {
            company_code,
            customer_code,
            customer_name: input.customer_name.map(str::to_string),
        },
        order: LedgerOrderPayload { header, detail },
        payments,
        stock_issue,
        transfers,
        promotion_codes,
    })
}
