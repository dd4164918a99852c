use garde::Validate;
use serde::{Deserialize, Serialize};

/// Restaurant as listed in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub dish_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dish {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub price: f64,
}

/// A restaurant together with its whole menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantDetail {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub dishes: Vec<Dish>,
}

/// Restaurant fields embedded in a dish lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantRef {
    pub id: i64,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DishDetail {
    #[serde(flatten)]
    pub dish: Dish,
    pub restaurant: RestaurantRef,
}

/// Query string of `GET /api/restaurants`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RestaurantQuery {
    /// Case-insensitive substring of the restaurant name.
    #[garde(length(max = 100))]
    pub search: Option<String>,
}

impl RestaurantQuery {
    /// Search term with surrounding whitespace removed; blank means no filter.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Every matching restaurant, ordered by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantList {
    pub restaurants: Vec<Restaurant>,
    pub total: usize,
}

impl RestaurantList {
    pub fn new(restaurants: Vec<Restaurant>) -> Self {
        Self {
            total: restaurants.len(),
            restaurants,
        }
    }
}
