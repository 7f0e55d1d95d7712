use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

/// Parses a CSS selector, keeping the parser's message in the error.
pub fn parse_selector(css_selector: &str) -> Result<Selector> {
    Selector::parse(css_selector)
        .map_err(|why| anyhow!("Failed to Selector::parse({}) because: {:?}", css_selector, why))
}

/// Returns the visible text of the first element in `document` matching
/// `css_selector`.
///
/// Every text node is trimmed and the pieces are joined with a single space,
/// so adjacent numbers in sibling spans stay apart.
///
/// # Examples
///
/// ```
/// let document = Html::parse_document(r#"<div class="price"><span>1.234,56</span><span>€</span></div>"#);
/// assert_eq!(select_first_text(&document, ".price"), Some("1.234,56 €".to_string()));
/// ```
pub fn select_first_text(document: &Html, css_selector: &str) -> Option<String> {
    let selector = parse_selector(css_selector).ok()?;
    document.select(&selector).next().map(visible_text)
}

/// Joins the trimmed, non empty text nodes of an element.
pub fn visible_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
