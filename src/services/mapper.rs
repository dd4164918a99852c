//! Normalization of raw recognizer documents.
//!
//! Recognizer revisions disagree on field names (Chinese keys from the
//! vision model prompt, English keys from later revisions). Each logical
//! field is looked up under every known key; the first non-empty value wins.

use serde_json::Value;

use crate::models::menu::{
    CanonicalRecognitionResult, RecognitionHints, RecognizedDish, RecognizedRestaurant,
};
use crate::services::price;

pub const UNKNOWN_RESTAURANT: &str = "unknown restaurant";
pub const UNKNOWN_DISH: &str = "unknown dish";
pub const UNKNOWN_LOCATION: &str = "unknown";
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

const RESTAURANT_NAME_KEYS: &[&str] = &["店名", "restaurant_name"];
const LOCATION_KEYS: &[&str] = &["window_number", "location"];
const DISHES_KEYS: &[&str] = &["菜品", "dishes"];
const DISH_NAME_KEYS: &[&str] = &["名称", "name"];
const DISH_PRICE_KEYS: &[&str] = &["价格", "price"];

/// Map a raw recognizer document onto the canonical shape.
///
/// Total over arbitrary input: malformed documents and dish entries degrade
/// to sentinel names and zero prices instead of failing.
pub fn map_recognition(raw: Value, hints: &RecognitionHints) -> CanonicalRecognitionResult {
    let name = first_text(&raw, RESTAURANT_NAME_KEYS).unwrap_or(UNKNOWN_RESTAURANT);

    let location = hints
        .location
        .as_deref()
        .filter(|l| !l.is_empty())
        .or_else(|| first_text(&raw, LOCATION_KEYS))
        .unwrap_or(UNKNOWN_LOCATION);

    let restaurant = RecognizedRestaurant {
        id: hints.restaurant_id,
        name: name.to_string(),
        location: location.to_string(),
    };

    let dishes = DISHES_KEYS
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_array))
        .map(|entries| entries.iter().map(map_dish).collect())
        .unwrap_or_default();

    CanonicalRecognitionResult {
        restaurant,
        dishes,
        raw_data: raw,
    }
}

fn map_dish(entry: &Value) -> RecognizedDish {
    let name = first_text(entry, DISH_NAME_KEYS).unwrap_or(UNKNOWN_DISH);

    let price_value = DISH_PRICE_KEYS
        .iter()
        .filter_map(|key| entry.get(*key))
        .find(|v| is_present(v))
        .unwrap_or(&Value::Null);
    let range = price::parse_price(price_value);

    let confidence = entry
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| *c != 0.0 && c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    RecognizedDish {
        name: name.to_string(),
        price: range.price,
        min_price: range.min_price,
        max_price: range.max_price,
        original_price_text: price_value.as_str().unwrap_or_default().to_string(),
        confidence,
    }
}

/// First non-empty string stored under any of `keys`.
fn first_text<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}
