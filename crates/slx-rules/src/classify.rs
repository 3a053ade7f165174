//! Order-type classification.
//!
//! Channel feeds label orders with free text ("01.Thường", "03.Đổi điểm",
//! ...). The label is matched against a table of (pattern, kind, category)
//! rows and collapses to exactly one [`OrderCategory`]. When several rows
//! match, the category declared first in the enum wins.

use serde::{Deserialize, Serialize};

/// Closed set of order categories, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderCategory {
    PointExchange,
    ContainerExchange,
    InvestmentTransfer,
    BirthdayGift,
    ServiceConversion,
    CardSplit,
    AccountSale,
    MarketplaceOrder,
    FeeWaivedService,
    /// Wholesale shipment to a dealer.
    DealerTransfer,
    /// Wholesale zero-revenue promotional shipment.
    PromotionalShipment,
    StandardRetail,
    Unclassified,
}

impl OrderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderCategory::PointExchange => "point_exchange",
            OrderCategory::ContainerExchange => "container_exchange",
            OrderCategory::InvestmentTransfer => "investment_transfer",
            OrderCategory::BirthdayGift => "birthday_gift",
            OrderCategory::ServiceConversion => "service_conversion",
            OrderCategory::CardSplit => "card_split",
            OrderCategory::AccountSale => "account_sale",
            OrderCategory::MarketplaceOrder => "marketplace_order",
            OrderCategory::FeeWaivedService => "fee_waived_service",
            OrderCategory::DealerTransfer => "dealer_transfer",
            OrderCategory::PromotionalShipment => "promotional_shipment",
            OrderCategory::StandardRetail => "standard_retail",
            OrderCategory::Unclassified => "unclassified",
        }
    }

    /// Container, point and investment exchanges.
    pub fn is_exchange(&self) -> bool {
        matches!(
            self,
            OrderCategory::PointExchange
                | OrderCategory::ContainerExchange
                | OrderCategory::InvestmentTransfer
        )
    }

    /// Unit price is recomputed from gross amount when the feed reports zero.
    pub fn recomputes_price(&self) -> bool {
        !(self.is_exchange() || *self == OrderCategory::StandardRetail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Prefix,
    Contains,
}

/// One row of the classification table. `pattern` is compared lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTypePattern {
    pub pattern: String,
    pub kind: MatchKind,
    pub category: OrderCategory,
}

impl OrderTypePattern {
    fn new(pattern: &str, kind: MatchKind, category: OrderCategory) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind,
            category,
        }
    }

    fn matches(&self, label_lower: &str) -> bool {
        let p = self.pattern.trim().to_lowercase();
        if p.is_empty() {
            return false;
        }
        match self.kind {
            MatchKind::Prefix => label_lower.starts_with(&p),
            MatchKind::Contains => label_lower.contains(&p),
        }
    }
}

/// Classify a free-text label. Total: unmatched labels are `Unclassified`.
pub fn classify(label: &str, patterns: &[OrderTypePattern]) -> OrderCategory {
    let lower = label.trim().to_lowercase();
    patterns
        .iter()
        .filter(|p| p.matches(&lower))
        .map(|p| p.category)
        .min()
        .unwrap_or(OrderCategory::Unclassified)
}

pub fn default_order_type_patterns() -> Vec<OrderTypePattern> {
    use MatchKind::{Contains, Prefix};
    use OrderCategory::*;
    vec![
        OrderTypePattern::new("03.", Prefix, PointExchange),
        OrderTypePattern::new("đổi điểm", Contains, PointExchange),
        OrderTypePattern::new("đổi vỏ", Contains, ContainerExchange),
        OrderTypePattern::new("đầu tư", Contains, InvestmentTransfer),
        OrderTypePattern::new("sinh nhật", Contains, BirthdayGift),
        OrderTypePattern::new("đổi dv", Contains, ServiceConversion),
        OrderTypePattern::new("chuyển dv", Contains, ServiceConversion),
        OrderTypePattern::new("đổi dịch vụ", Contains, ServiceConversion),
        OrderTypePattern::new("tách thẻ", Contains, CardSplit),
        OrderTypePattern::new("bán tài khoản", Contains, AccountSale),
        OrderTypePattern::new("sàn tmđt", Contains, MarketplaceOrder),
        OrderTypePattern::new("ecommerce", Contains, MarketplaceOrder),
        OrderTypePattern::new("miễn phí dv", Contains, FeeWaivedService),
        OrderTypePattern::new("xuất đại lý", Contains, DealerTransfer),
        OrderTypePattern::new("xuất khuyến mại", Contains, PromotionalShipment),
        OrderTypePattern::new("01.", Prefix, StandardRetail),
        OrderTypePattern::new("thường", Contains, StandardRetail),
        OrderTypePattern::new("bán lẻ", Contains, StandardRetail),
    ]
}
