use std::sync::Arc;
use tracing::{info, warn};

use crate::models::menu::{CanonicalRecognitionResult, RecognizedRestaurant};
use crate::services::catalog::{CatalogError, CatalogStore, CatalogTransaction, DishWrite};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `None` when the restaurant could be neither upserted nor found by name;
    /// no dishes are written in that case.
    pub restaurant_id: Option<i64>,
    pub dishes_inserted: usize,
    pub dishes_updated: usize,
    pub dishes_skipped: usize,
}

/// Writes recognized restaurants and dishes into the catalog.
#[derive(Clone)]
pub struct Reconciler {
    catalog: Arc<dyn CatalogStore>,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Upsert the recognized restaurant and its dishes in a single transaction.
    ///
    /// Dish-level failures are logged and skipped. Only failing to open or
    /// commit the transaction is reported as an error.
    pub async fn reconcile(
        &self,
        result: &CanonicalRecognitionResult,
        job_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut tx = self.catalog.begin().await.map_err(ReconcileError::Begin)?;

        let restaurant_id = match result.restaurant.id {
            Some(id) => Some(id),
            None => resolve_restaurant(tx.as_mut(), &result.restaurant, job_id).await,
        };

        let mut outcome = ReconcileOutcome {
            restaurant_id,
            ..Default::default()
        };

        match restaurant_id {
            None => {
                info!(
                    job_id = %job_id,
                    restaurant = %result.restaurant.name,
                    dishes = result.dishes.len(),
                    "Restaurant unresolved, skipping dish upserts"
                );
            }
            Some(restaurant_id) => {
                for dish in &result.dishes {
                    let price = if dish.price.is_finite() { dish.price } else { 0.0 };

                    match tx.upsert_dish(restaurant_id, &dish.name, price).await {
                        Ok(DishWrite::Inserted) => outcome.dishes_inserted += 1,
                        Ok(DishWrite::Updated) => outcome.dishes_updated += 1,
                        Err(e) => {
                            warn!(
                                job_id = %job_id,
                                restaurant_id,
                                dish = %dish.name,
                                error = %e,
                                "Failed to upsert dish, skipping"
                            );
                            metrics::counter!("catalog_dish_upsert_failures").increment(1);
                            outcome.dishes_skipped += 1;
                        }
                    }
                }
            }
        }

        tx.commit().await.map_err(ReconcileError::Commit)?;

        info!(
            job_id = %job_id,
            restaurant_id = ?outcome.restaurant_id,
            inserted = outcome.dishes_inserted,
            updated = outcome.dishes_updated,
            skipped = outcome.dishes_skipped,
            "Catalog reconciled"
        );

        Ok(outcome)
    }
}

/// Upsert by `(name, location)`, falling back to a lookup by name.
async fn resolve_restaurant(
    tx: &mut dyn CatalogTransaction,
    restaurant: &RecognizedRestaurant,
    job_id: &str,
) -> Option<i64> {
    let err = match tx
        .upsert_restaurant(&restaurant.name, &restaurant.location)
        .await
    {
        Ok(id) => return Some(id),
        Err(e) => e,
    };

    warn!(
        job_id = %job_id,
        restaurant = %restaurant.name,
        error = %err,
        "Restaurant upsert failed, falling back to name lookup"
    );

    match tx.find_restaurant_by_name(&restaurant.name).await {
        Ok(found) => found,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Restaurant name lookup failed");
            None
        }
    }
}

/// Display text is stored on the failed job and shown to the uploader, so it
/// never includes the database error; that stays in `source()` for logging.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Catalog transaction could not be started")]
    Begin(#[source] CatalogError),

    #[error("Catalog update could not be committed")]
    Commit(#[source] CatalogError),
}
