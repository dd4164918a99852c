use serde::{Deserialize, Serialize};

/// Numeric price range extracted from free-form menu text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PriceRange {
    /// Canonical price: always the lowest value found.
    pub price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Restaurant as recognized from a menu photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedRestaurant {
    /// `None` until the catalog has matched or created the row.
    pub id: Option<i64>,
    pub name: String,
    pub location: String,
}

/// Dish as recognized from a menu photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedDish {
    pub name: String,
    pub price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub original_price_text: String,
    pub confidence: f64,
}

/// Normalized recognizer output, independent of the recognizer's field naming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalRecognitionResult {
    pub restaurant: RecognizedRestaurant,
    pub dishes: Vec<RecognizedDish>,
    /// Untouched recognizer document, kept for auditing.
    pub raw_data: serde_json::Value,
}

/// Caller-supplied hints attached to an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognitionHints {
    pub restaurant_id: Option<i64>,
    pub location: Option<String>,
}
