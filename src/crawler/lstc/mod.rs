//! # Lang & Schwarz Tradecenter
//!
//! 報價頁面：`https://www.ls-tc.de/de/aktie/{WKN 或 ISIN}`
//!
//! The page renders the last price in one of a few containers depending on
//! the instrument type, see `price::PRICE_SELECTORS`.

use concat_string::concat_string;

use crate::{
    config,
    crawler::{PriceLocator, SelectorLocator},
};

/// 即時報價
pub mod price;

/// Lang & Schwarz 的主機域名
pub const HOST: &str = "www.ls-tc.de";

pub struct LangSchwarz {
    base_url: String,
    user_agent: Option<String>,
    locators: Vec<Box<dyn PriceLocator>>,
}

impl LangSchwarz {
    pub fn new(settings: &config::Quote) -> Self {
        LangSchwarz {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
            locators: price::PRICE_SELECTORS
                .iter()
                .map(|s| Box::new(SelectorLocator(*s)) as Box<dyn PriceLocator>)
                .collect(),
        }
    }

    /// Quote page of a WKN or an ISIN.
    pub fn quote_url(&self, identifier: &str) -> String {
        concat_string!(
            self.base_url,
            "/de/aktie/",
            urlencoding::encode(identifier.trim())
        )
    }
}
