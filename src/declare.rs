use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 追蹤的商品
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    /// WKN, also the key in the reference store
    pub short_code: String,
    pub display_name: String,
    /// ISIN, used when the short code lookup fails
    #[serde(default)]
    pub long_code: String,
}

impl Instrument {
    pub fn new(short_code: &str, display_name: &str, long_code: &str) -> Self {
        Instrument {
            short_code: short_code.to_string(),
            display_name: display_name.to_string(),
            long_code: long_code.to_string(),
        }
    }

    /// Identifiers in lookup order. An empty long code is skipped.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        [self.short_code.as_str(), self.long_code.as_str()]
            .into_iter()
            .filter(|id| !id.is_empty())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name, self.short_code)
    }
}

/// 報價頁面上取得的價格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteSnapshot {
    pub price: Decimal,
    /// 漲跌
    pub change: Option<Decimal>,
    /// 漲跌幅(%)
    pub change_percent: Option<Decimal>,
}

impl QuoteSnapshot {
    pub fn new(price: Decimal) -> Self {
        QuoteSnapshot {
            price,
            change: None,
            change_percent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[strum(serialize = "up")]
    Up,
    #[strum(serialize = "down")]
    Down,
}

impl Direction {
    pub fn emoji(&self) -> &'static str {
        match self {
            Direction::Up => "🚀",
            Direction::Down => "⚠️",
        }
    }
}

/// How the reference price moves after an alert.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertMode {
    /// The reference resets to the alerted price.
    #[default]
    Trailing,
    /// The reference keeps the first price ever seen.
    Fixed,
}
