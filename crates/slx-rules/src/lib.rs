//! slx-rules
//!
//! Accounting rule resolver. Pure and total: every input yields an
//! [`AccountingResolution`], possibly with empty buckets and pass-through
//! accounts. Whether an empty result is acceptable is the posting
//! pipeline's decision.
//!
//! Resolution steps, each a pure sub-function:
//! 1. classify the order-type label ([`classify`])
//! 2. account triple, wholesale table or ordered retail rules ([`accounts`])
//! 3. promotion and gift codes ([`promo`])
//! 4. 22 discount buckets with payment exclusivity ([`buckets`])
//! 5. price / subtotal reconciliation ([`pricing`])

pub mod accounts;
pub mod buckets;
pub mod classify;
pub mod pricing;
pub mod promo;
pub mod tables;

use serde::{Deserialize, Serialize};
use slx_schemas::{CanonicalSale, OrderFee, OrderPayment, ProductInfo};

pub use accounts::AccountTriple;
pub use buckets::{BucketSet, DiscountBucket, PaymentMode, BUCKET_COUNT, FORCED_ZERO_CODE};
pub use classify::{classify, MatchKind, OrderCategory, OrderTypePattern};
pub use pricing::Pricing;
pub use promo::{truncate_promotion_code, PromotionCodes};
pub use tables::RuleTables;

/// Everything the resolver looks at for one line.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub sale: &'a CanonicalSale,
    pub product: &'a ProductInfo,
    pub order_type_label: &'a str,
    pub brand: &'a str,
    pub is_wholesale: bool,
    /// Payment-method records of the sale's order.
    pub payments: &'a [OrderPayment],
    /// Companion fee records of the sale's order.
    pub fees: &'a [OrderFee],
}

impl<'a> ResolveInput<'a> {
    /// Input drawn from the sale's own label, brand and wholesale flag.
    pub fn for_sale(
        sale: &'a CanonicalSale,
        product: &'a ProductInfo,
        payments: &'a [OrderPayment],
        fees: &'a [OrderFee],
    ) -> Self {
        Self {
            sale,
            product,
            order_type_label: &sale.order_type_label,
            brand: &sale.brand,
            is_wholesale: sale.is_wholesale,
            payments,
            fees,
        }
    }

    /// Explicit flag, or inferred from a companion fee whose code the
    /// tables list as a marketplace fee. Shipping and other fees don't count.
    pub fn is_marketplace(&self, tables: &RuleTables) -> bool {
        self.sale.is_marketplace
            || self
                .fees
                .iter()
                .any(|f| tables.is_marketplace_fee(&f.fee_code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingResolution {
    pub category: OrderCategory,
    pub buckets: BucketSet,
    pub accounts: AccountTriple,
    pub promotion: PromotionCodes,
    pub tax_code: String,
    pub transaction_type: String,
    pub pricing: Pricing,
}

pub fn resolve(input: &ResolveInput<'_>, tables: &RuleTables) -> AccountingResolution {
    let category = classify(input.order_type_label, &tables.order_types);
    let is_marketplace = input.is_marketplace(tables);

    let accounts = accounts::resolve_accounts(
        input.sale,
        input.product,
        category,
        input.is_wholesale,
        tables,
    );
    let promotion = promo::resolve_promotion(
        input.sale,
        input.product,
        category,
        input.brand,
        is_marketplace,
        tables,
    );
    let buckets = buckets::assign_buckets(
        &buckets::BucketInput {
            sale: input.sale,
            product: input.product,
            brand: input.brand,
            category,
            is_wholesale: input.is_wholesale,
            is_marketplace,
            payment_mode: PaymentMode::from_payments(input.payments),
            code01: promotion.code01.as_deref(),
        },
        tables,
    );

    AccountingResolution {
        category,
        buckets,
        accounts,
        tax_code: tables.tax_code(input.sale.tax_rate),
        transaction_type: tables.transaction_type(category),
        pricing: pricing::reconcile_price(input.sale, category),
        promotion,
    }
}
