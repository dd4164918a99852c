use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::menu::PriceRange;

// ASCII digits only: OCR output mixes in full-width digits that `f64` cannot parse.
static PRICE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+\.?[0-9]*").expect("price pattern is valid")
});

/// Extract a price range from a recognizer price field.
///
/// Only string values are parsed; anything else (numbers, null, objects)
/// yields a zero range.
pub fn parse_price(value: &Value) -> PriceRange {
    match value {
        Value::String(text) => parse_price_text(text),
        _ => PriceRange::default(),
    }
}

/// Extract every number in `text` and report the lowest as the canonical price.
///
/// Menu boards often show ranges such as `"10-15元"`; the lowest figure wins.
pub fn parse_price_text(text: &str) -> PriceRange {
    let mut prices: Vec<f64> = PRICE_NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .collect();

    if prices.is_empty() {
        return PriceRange::default();
    }

    prices.sort_by(|a, b| a.total_cmp(b));

    PriceRange {
        price: prices[0],
        min_price: prices[0],
        max_price: prices[prices.len() - 1],
    }
}
