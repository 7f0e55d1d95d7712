use std::{collections::HashSet, str::FromStr};

use anyhow::*;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Symbols that may surround a number on a German quote page.
const NUMBER_ESCAPE_CHAR: &[char] = &['€', '%', ' ', '\u{a0}', '"', '\n', '\t'];

/// `1.234.567,89`, `-0,42`, `123,45`. Thousands groups are only accepted in
/// blocks of three digits, anything else falls through to the plain form.
static REG_GERMAN_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[+-]?\d{1,3}(?:\.\d{3})+,\d+|[+-]?\d+,\d+")
        .expect("Failed to compile german number regex")
});

/// Parses a decimal value from a given string.
///
/// The string is expected in the plain `1234.56` form. Escape characters
/// (currency, percent, whitespace) are removed before parsing.
///
/// # Example
///
/// ```
/// let value = parse_decimal("1234.56 €", None).unwrap();
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// Parses a number written with German separators, e.g. `1.234,56 €`.
///
/// Dots are thousands separators and are dropped, the comma is the decimal
/// separator.
pub fn parse_german_decimal(s: &str) -> Result<Decimal> {
    let normalized = clean_escape_chars(s, None).replace('.', "").replace(',', ".");
    parse_decimal(&normalized, None)
}

/// Returns every German formatted number found in `s`, in order of
/// appearance. Currency and percent symbols are ignored.
///
/// # Example
///
/// ```
/// let numbers = find_german_decimals("1.234,56 € +12,30 +1,01 %");
/// assert_eq!(numbers.len(), 3);
/// ```
pub fn find_german_decimals(s: &str) -> Vec<Decimal> {
    let cleaned = s.replace(['€', '%'], " ");
    REG_GERMAN_NUMBER
        .find_iter(&cleaned)
        .filter_map(|m| parse_german_decimal(m.as_str()).ok())
        .collect()
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

/// Removes a set of escape characters from a given string.
///
/// The characters in `NUMBER_ESCAPE_CHAR` are always removed; `escape_chars`
/// adds more.
pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.chars().filter(|c| !filters.contains(c)).collect()
}
