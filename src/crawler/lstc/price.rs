use async_trait::async_trait;

use crate::{
    crawler::{extract_quote, lstc::LangSchwarz, QuoteSource},
    declare::QuoteSnapshot,
    error::FetchError,
    logging,
    util::http,
};

/// 價格容器，依序嘗試
pub const PRICE_SELECTORS: [&str; 3] = [".price", ".mono", ".instrument-price"];

#[async_trait]
impl QuoteSource for LangSchwarz {
    async fn get_stock_quotes(&self, identifier: &str) -> Result<QuoteSnapshot, FetchError> {
        let url = self.quote_url(identifier);
        let headers = self.user_agent.as_deref().and_then(http::user_agent_header);
        let text = http::get(&url, headers)
            .await
            .map_err(|why| FetchError::request(identifier, why))?;

        let quote =
            extract_quote(&text, &self.locators).ok_or_else(|| FetchError::not_found(identifier))?;
        logging::debug_file_async(format!("{} {:?}", identifier, quote));

        Ok(quote)
    }
}
