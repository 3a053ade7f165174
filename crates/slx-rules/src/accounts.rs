//! Account triple (discount account, expense account, fee code).

use serde::{Deserialize, Serialize};
use slx_schemas::{CanonicalSale, ProductInfo, ProductType};

use crate::classify::OrderCategory;
use crate::tables::RuleTables;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTriple {
    pub discount_account: Option<String>,
    pub expense_account: Option<String>,
    pub fee_code: Option<String>,
}

impl AccountTriple {
    /// Whatever the sale already carried.
    pub fn pass_through(sale: &CanonicalSale) -> Self {
        Self {
            discount_account: sale.discount_account.clone(),
            expense_account: sale.expense_account.clone(),
            fee_code: sale.fee_code.clone(),
        }
    }

    fn with_discount(sale: &CanonicalSale, account: &str) -> Self {
        Self {
            discount_account: Some(account.to_string()),
            ..Self::pass_through(sale)
        }
    }
}

pub(crate) fn resolve_accounts(
    sale: &CanonicalSale,
    product: &ProductInfo,
    category: OrderCategory,
    is_wholesale: bool,
    tables: &RuleTables,
) -> AccountTriple {
    if is_wholesale {
        wholesale_accounts(sale, product, tables)
    } else {
        retail_accounts(sale, product, category, tables)
    }
}

fn wholesale_accounts(sale: &CanonicalSale, product: &ProductInfo, tables: &RuleTables) -> AccountTriple {
    let Some(rule) = tables.wholesale_account(product.category, product.is_ecode) else {
        return AccountTriple::pass_through(sale);
    };
    AccountTriple {
        discount_account: Some(rule.discount_account.clone()),
        expense_account: rule
            .expense_account
            .clone()
            .or_else(|| sale.expense_account.clone()),
        fee_code: rule.fee_code.clone().or_else(|| sale.fee_code.clone()),
    }
}

/// First matching rule wins.
fn retail_accounts(
    sale: &CanonicalSale,
    product: &ProductInfo,
    category: OrderCategory,
    tables: &RuleTables,
) -> AccountTriple {
    let acc = &tables.retail_accounts;
    let a = &sale.amounts;
    let has_promo = sale
        .promotion_code
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());

    if category.is_exchange() {
        return AccountTriple {
            discount_account: sale.discount_account.clone(),
            expense_account: Some(acc.exchange_expense_account.clone()),
            fee_code: Some(acc.exchange_fee_code.clone()),
        };
    }
    if category == OrderCategory::BirthdayGift {
        return AccountTriple {
            discount_account: sale.discount_account.clone(),
            expense_account: Some(acc.birthday_expense_account.clone()),
            fee_code: Some(acc.birthday_fee_code.clone()),
        };
    }
    if sale.is_gift && has_promo {
        return AccountTriple {
            discount_account: sale.discount_account.clone(),
            expense_account: Some(acc.gift_expense_account.clone()),
            fee_code: sale.fee_code.clone(),
        };
    }
    if a.grade_disc_amt != 0 {
        match product.product_type {
            ProductType::Goods => return AccountTriple::with_discount(sale, &acc.vip_goods_account),
            ProductType::Service => {
                return AccountTriple::with_discount(sale, &acc.vip_service_account)
            }
            ProductType::Voucher => {}
        }
    }
    if a.voucher_amt != 0 {
        let account = if sale.is_gift {
            &acc.voucher_gift_account
        } else if product.product_type == ProductType::Goods {
            &acc.voucher_goods_account
        } else {
            &acc.voucher_service_account
        };
        return AccountTriple::with_discount(sale, account);
    }
    if a.disc_amt != 0 {
        let account = if product.product_type == ProductType::Goods {
            &acc.purchase_goods_account
        } else {
            &acc.purchase_service_account
        };
        return AccountTriple::with_discount(sale, account);
    }
    AccountTriple::pass_through(sale)
}
