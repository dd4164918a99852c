use async_trait::async_trait;

use crate::models::catalog::{DishDetail, RestaurantDetail, RestaurantList, RestaurantQuery};

/// Entry point to the restaurant/dish catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError>;
}

/// One catalog transaction.
///
/// Each write runs in its own savepoint, so a failed statement leaves the
/// transaction usable for the following ones.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Insert `(name, location)` or, on conflict, refresh the existing row's
    /// name and return its id.
    async fn upsert_restaurant(&mut self, name: &str, location: &str)
        -> Result<i64, CatalogError>;

    /// Lowest restaurant id with exactly this name.
    async fn find_restaurant_by_name(&mut self, name: &str) -> Result<Option<i64>, CatalogError>;

    /// Update the price of `(restaurant_id, name)`, inserting the dish when no
    /// row was affected.
    async fn upsert_dish(
        &mut self,
        restaurant_id: i64,
        name: &str,
        price: f64,
    ) -> Result<DishWrite, CatalogError>;

    async fn commit(self: Box<Self>) -> Result<(), CatalogError>;
}

/// Read side of the catalog, used by the browse endpoints.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Restaurants ordered by name.
    async fn list_restaurants(&self, query: &RestaurantQuery)
        -> Result<RestaurantList, CatalogError>;

    /// The restaurant with its dishes ordered by name.
    async fn restaurant_detail(&self, id: i64) -> Result<Option<RestaurantDetail>, CatalogError>;

    async fn dish_detail(&self, id: i64) -> Result<Option<DishDetail>, CatalogError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DishWrite {
    Inserted,
    Updated,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog rejected write: {0}")]
    Rejected(String),
}
