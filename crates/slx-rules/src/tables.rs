//! Configuration-data lookup tables consumed by the resolver.
//!
//! Every per-brand, per-branch and per-category literal lives here rather
//! than in control flow. `RuleTables::default()` is a complete working set;
//! the `rules:` config section overrides any field.

use serde::{Deserialize, Serialize};
use slx_schemas::{ProductCategory, ProductType};
use std::collections::BTreeMap;

use crate::classify::{default_order_type_patterns, OrderCategory, OrderTypePattern};

/// Fixed account constants for the retail branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetailAccounts {
    pub exchange_expense_account: String,
    pub exchange_fee_code: String,
    pub birthday_expense_account: String,
    pub birthday_fee_code: String,
    pub gift_expense_account: String,
    pub vip_goods_account: String,
    pub vip_service_account: String,
    pub voucher_gift_account: String,
    pub voucher_goods_account: String,
    pub voucher_service_account: String,
    pub purchase_goods_account: String,
    pub purchase_service_account: String,
}

impl Default for RetailAccounts {
    fn default() -> Self {
        Self {
            exchange_expense_account: "64190".to_string(),
            exchange_fee_code: "CP_DOIQUA".to_string(),
            birthday_expense_account: "64180".to_string(),
            birthday_fee_code: "CP_SINHNHAT".to_string(),
            gift_expense_account: "64170".to_string(),
            vip_goods_account: "5211".to_string(),
            vip_service_account: "5212".to_string(),
            voucher_gift_account: "5213".to_string(),
            voucher_goods_account: "5214".to_string(),
            voucher_service_account: "5215".to_string(),
            purchase_goods_account: "5216".to_string(),
            purchase_service_account: "5217".to_string(),
        }
    }
}

/// Wholesale account triple for one (category, ecode) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WholesaleAccountRule {
    pub category: ProductCategory,
    pub ecode: bool,
    pub discount_account: String,
    #[serde(default)]
    pub expense_account: Option<String>,
    #[serde(default)]
    pub fee_code: Option<String>,
}

/// VIP bucket code for a brand and product type. `brand: None` matches any brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipCodeRule {
    #[serde(default)]
    pub brand: Option<String>,
    pub product_type: ProductType,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRewrite {
    pub from: String,
    pub to: String,
}

/// Gift-code override for dealer shipments, keyed by product sub-category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealerGiftCodes {
    pub sub_categories: Vec<String>,
    pub code_in_set: String,
    pub code_otherwise: String,
}

impl Default for DealerGiftCodes {
    fn default() -> Self {
        Self {
            sub_categories: vec!["DUNG_CU".to_string(), "MAY".to_string()],
            code_in_set: "KMDL.TB".to_string(),
            code_otherwise: "KMDL.SP".to_string(),
        }
    }
}

/// Codes for buckets whose code does not come from a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedBucketCodes {
    pub purchase_discount: String,
    pub retail_policy: String,
    pub coupon: String,
    pub voucher: String,
    pub voucher2: String,
    pub voucher3: String,
    pub voucher4: String,
    pub marketplace_voucher: String,
    pub marketplace_voucher_label: String,
}

impl Default for FixedBucketCodes {
    fn default() -> Self {
        Self {
            purchase_discount: "CKMH".to_string(),
            retail_policy: "CKCS".to_string(),
            coupon: "COUPON".to_string(),
            voucher: "VOUCHER".to_string(),
            voucher2: "VOUCHER2".to_string(),
            voucher3: "VOUCHER3".to_string(),
            voucher4: "VOUCHER4".to_string(),
            marketplace_voucher: "VC_SAN".to_string(),
            marketplace_voucher_label: "VC_SAN.NB".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    pub order_types: Vec<OrderTypePattern>,
    pub retail_accounts: RetailAccounts,
    pub wholesale_accounts: Vec<WholesaleAccountRule>,
    /// Bucket 2 prefix for wholesale lines (`CKCSBH[.E].<category>`).
    pub wholesale_policy_prefix: String,
    pub vip_codes: Vec<VipCodeRule>,
    /// Bucket 11 code by brand.
    pub ewallet_codes: BTreeMap<String, String>,
    pub default_ewallet_code: String,
    /// Marketplace `code01` literal by brand.
    pub marketplace_codes: BTreeMap<String, String>,
    pub default_marketplace_code: String,
    /// Fee codes that mark an order as a marketplace order.
    pub marketplace_fee_codes: Vec<String>,
    /// Point-exchange gift code by branch.
    pub point_gift_codes: BTreeMap<String, String>,
    pub prefix_rewrites: Vec<PrefixRewrite>,
    /// Promotion codes that never receive a product-type suffix.
    pub employee_discount_codes: Vec<String>,
    pub dealer_gift_codes: DealerGiftCodes,
    /// Upstream field name feeding each pass-through bucket (9..=22).
    pub pass_through_fields: BTreeMap<u8, String>,
    /// Tax code by VAT rate (whole percent, as string key).
    pub tax_codes: BTreeMap<String, String>,
    pub default_tax_code: String,
    pub transaction_types: BTreeMap<OrderCategory, String>,
    pub default_transaction_type: String,
    pub bucket_codes: FixedBucketCodes,
}

impl Default for RuleTables {
    fn default() -> Self {
        let wholesale_accounts = [
            (ProductCategory::Cosmetics, false, "52111"),
            (ProductCategory::Cosmetics, true, "52112"),
            (ProductCategory::Supplements, false, "52121"),
            (ProductCategory::Supplements, true, "52122"),
            (ProductCategory::DurableGoods, false, "52131"),
            (ProductCategory::DurableGoods, true, "52132"),
        ]
        .into_iter()
        .map(|(category, ecode, acct)| WholesaleAccountRule {
            category,
            ecode,
            discount_account: acct.to_string(),
            expense_account: None,
            fee_code: None,
        })
        .collect();

        let vip_codes = [
            (None, ProductType::Goods, "CKVIP.I"),
            (None, ProductType::Service, "CKVIP.S"),
            (None, ProductType::Voucher, "CKVIP.V"),
            (Some("TTM"), ProductType::Goods, "TTM.CKVIP.I"),
            (Some("TTM"), ProductType::Service, "TTM.CKVIP.S"),
        ]
        .into_iter()
        .map(|(brand, product_type, code)| VipCodeRule {
            brand: brand.map(str::to_string),
            product_type,
            code: code.to_string(),
        })
        .collect();

        let pass_through_fields = (9u8..=22)
            .map(|slot| (slot, format!("ck{slot:02}")))
            .collect();

        let transaction_types = [
            (OrderCategory::StandardRetail, "BL"),
            (OrderCategory::PointExchange, "DD"),
            (OrderCategory::ContainerExchange, "DV"),
            (OrderCategory::InvestmentTransfer, "DT"),
            (OrderCategory::BirthdayGift, "SN"),
            (OrderCategory::ServiceConversion, "CDV"),
            (OrderCategory::CardSplit, "TT"),
            (OrderCategory::AccountSale, "BTK"),
            (OrderCategory::MarketplaceOrder, "TMDT"),
            (OrderCategory::FeeWaivedService, "MPDV"),
            (OrderCategory::DealerTransfer, "BB"),
            (OrderCategory::PromotionalShipment, "BBKM"),
        ]
        .into_iter()
        .map(|(c, code)| (c, code.to_string()))
        .collect();

        Self {
            order_types: default_order_type_patterns(),
            retail_accounts: RetailAccounts::default(),
            wholesale_accounts,
            wholesale_policy_prefix: "CKCSBH".to_string(),
            vip_codes,
            ewallet_codes: map(&[("TTM", "VIDIEN.TTM"), ("BIO", "VIDIEN.BIO")]),
            default_ewallet_code: "VIDIEN".to_string(),
            marketplace_codes: map(&[("TTM", "TMDT.TTM"), ("BIO", "TMDT.BIO")]),
            default_marketplace_code: "TMDT".to_string(),
            marketplace_fee_codes: vec!["PHI_SAN".to_string(), "HOAHONG_SAN".to_string()],
            point_gift_codes: map(&[
                ("TTM", "TTM.KMDIEM"),
                ("HCM01", "HCM01.KMDIEM"),
                ("HN01", "HN01.KMDIEM"),
            ]),
            prefix_rewrites: vec![PrefixRewrite {
                from: "KMTT.".to_string(),
                to: "CKTT.".to_string(),
            }],
            employee_discount_codes: vec!["CKNV".to_string(), "CKNV.NB".to_string()],
            dealer_gift_codes: DealerGiftCodes::default(),
            pass_through_fields,
            tax_codes: map(&[("0", "00"), ("5", "05"), ("8", "08"), ("10", "10")]),
            default_tax_code: "10".to_string(),
            transaction_types,
            default_transaction_type: "BL".to_string(),
            bucket_codes: FixedBucketCodes::default(),
        }
    }
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl RuleTables {
    pub fn is_marketplace_fee(&self, fee_code: &str) -> bool {
        self.marketplace_fee_codes.iter().any(|c| c == fee_code)
    }

    pub fn vip_code(&self, brand: &str, product_type: ProductType) -> Option<&str> {
        let exact = self
            .vip_codes
            .iter()
            .find(|r| r.product_type == product_type && r.brand.as_deref() == Some(brand));
        let any = || {
            self.vip_codes
                .iter()
                .find(|r| r.product_type == product_type && r.brand.is_none())
        };
        exact.or_else(any).map(|r| r.code.as_str())
    }

    pub fn ewallet_code(&self, brand: &str) -> &str {
        self.ewallet_codes
            .get(brand)
            .map(String::as_str)
            .unwrap_or(&self.default_ewallet_code)
    }

    pub fn marketplace_code(&self, brand: &str) -> &str {
        self.marketplace_codes
            .get(brand)
            .map(String::as_str)
            .unwrap_or(&self.default_marketplace_code)
    }

    pub fn wholesale_account(
        &self,
        category: ProductCategory,
        ecode: bool,
    ) -> Option<&WholesaleAccountRule> {
        self.wholesale_accounts
            .iter()
            .find(|r| r.category == category && r.ecode == ecode)
    }

    /// `CKCSBH[.E].<category code>`.
    pub fn wholesale_policy_code(&self, category: ProductCategory, ecode: bool) -> String {
        let ecode_part = if ecode { ".E" } else { "" };
        format!(
            "{}{}.{}",
            self.wholesale_policy_prefix,
            ecode_part,
            category.code()
        )
    }

    pub fn tax_code(&self, rate: Option<u32>) -> String {
        rate.and_then(|r| self.tax_codes.get(&r.to_string()))
            .cloned()
            .unwrap_or_else(|| self.default_tax_code.clone())
    }

    pub fn transaction_type(&self, category: OrderCategory) -> String {
        self.transaction_types
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.default_transaction_type.clone())
    }

    pub fn is_employee_discount(&self, code: &str) -> bool {
        self.employee_discount_codes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    }
}
