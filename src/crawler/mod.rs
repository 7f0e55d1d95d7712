use async_trait::async_trait;
use scraper::Html;

use crate::{
    declare::{Instrument, QuoteSnapshot},
    error::FetchError,
    logging,
    util::{http::element, text},
};

/// Lang & Schwarz Tradecenter
pub mod lstc;

#[async_trait]
pub trait QuoteSource {
    /// 取得商品目前的報價
    async fn get_stock_quotes(&self, identifier: &str) -> Result<QuoteSnapshot, FetchError>;
}

/// One way of finding the price container on a quote page.
pub trait PriceLocator: Send + Sync {
    /// Visible text of the container, or `None` when the page has none.
    fn locate(&self, document: &Html) -> Option<String>;
}

/// Locates the first element matching a CSS selector.
#[derive(Debug, Clone, Copy)]
pub struct SelectorLocator(pub &'static str);

impl PriceLocator for SelectorLocator {
    fn locate(&self, document: &Html) -> Option<String> {
        element::select_first_text(document, self.0)
    }
}

/// Reads a quote from a page, trying `locators` in order.
///
/// A locator whose container holds no German number does not end the search;
/// the next one is tried. `None` means no locator produced a price.
pub fn extract_quote(html: &str, locators: &[Box<dyn PriceLocator>]) -> Option<QuoteSnapshot> {
    let document = Html::parse_document(html);
    locators
        .iter()
        .filter_map(|locator| locator.locate(&document))
        .find_map(|text| snapshot_from_text(&text))
}

/// The first number is the price, the next two (when present) the change
/// and the change in percent.
fn snapshot_from_text(s: &str) -> Option<QuoteSnapshot> {
    let mut numbers = text::find_german_decimals(s).into_iter();
    let price = numbers.next().filter(|p| p.is_sign_positive() && !p.is_zero())?;

    Some(QuoteSnapshot {
        price,
        change: numbers.next(),
        change_percent: numbers.next(),
    })
}

/// Looks the instrument up by its short code and, if that fails, once more by
/// its long code.
pub async fn fetch_quote_with_fallback<S>(
    source: &S,
    instrument: &Instrument,
) -> Result<QuoteSnapshot, FetchError>
where
    S: QuoteSource + ?Sized,
{
    let mut last_error = None;
    for identifier in instrument.identifiers() {
        match source.get_stock_quotes(identifier).await {
            Ok(quote) => return Ok(quote),
            Err(why) => {
                logging::warn_file_async(format!("{} via {}: {}", instrument, identifier, why));
                last_error = Some(why);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| FetchError::not_found(&instrument.short_code)))
}
