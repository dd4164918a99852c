//! In-process job, catalog and user stores.
//!
//! These mirror the PostgreSQL constraints (unique keys, foreign keys,
//! terminal-row guard) closely enough to exercise the pipeline without a
//! database, and expose fault switches for the partial-failure paths.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::catalog::{
    Dish, DishDetail, Restaurant, RestaurantDetail, RestaurantList, RestaurantQuery,
    RestaurantRef,
};
use crate::models::job::{JobState, NewJob, RecognitionJob};
use crate::services::catalog::{
    CatalogError, CatalogReader, CatalogStore, CatalogTransaction, DishWrite,
};
use crate::services::store::{JobStore, StoreError};
use crate::services::users::UserDirectory;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, RecognitionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, job_id: &str, state: JobState, result: Option<Value>, error: Option<&str>) -> bool {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(job_id) {
            Some(job) if job.state == JobState::Processing => {
                job.state = state;
                job.result = result;
                job.error = error.map(str::to_string);
                job.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &NewJob) -> Result<RecognitionJob, StoreError> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id.clone()));
        }
        let row = RecognitionJob {
            id: job.id.clone(),
            owner_user_id: job.owner_user_id,
            image_path: job.image_path.clone(),
            state: JobState::Processing,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        jobs.insert(job.id.clone(), row.clone());
        Ok(row)
    }

    async fn find_for_owner(
        &self,
        job_id: &str,
        owner_user_id: i64,
    ) -> Result<Option<RecognitionJob>, StoreError> {
        Ok(lock(&self.jobs)
            .get(job_id)
            .filter(|job| job.owner_user_id == owner_user_id)
            .cloned())
    }

    async fn mark_completed(&self, job_id: &str, payload: &Value) -> Result<bool, StoreError> {
        Ok(self.finish(job_id, JobState::Completed, Some(payload.clone()), None))
    }

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool, StoreError> {
        Ok(self.finish(job_id, JobState::Failed, None, Some(error)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRestaurant {
    pub id: i64,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDish {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub restaurants: Vec<StoredRestaurant>,
    pub dishes: Vec<StoredDish>,
    next_id: i64,
}

impl CatalogSnapshot {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Fault switches consulted by [`MemoryCatalog`] transactions.
#[derive(Debug, Default)]
pub struct CatalogFaults {
    pub fail_begin: bool,
    pub fail_restaurant_upsert: bool,
    pub fail_restaurant_lookup: bool,
    pub fail_commit: bool,
    pub failing_dishes: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogSnapshot>>,
    faults: Arc<Mutex<CatalogFaults>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        lock(&self.state).clone()
    }

    pub fn faults(&self) -> MutexGuard<'_, CatalogFaults> {
        lock(&self.faults)
    }

    /// Insert a restaurant directly and return its id.
    pub fn seed_restaurant(&self, name: &str, location: &str) -> i64 {
        let mut state = lock(&self.state);
        let id = state.allocate_id();
        state.restaurants.push(StoredRestaurant {
            id,
            name: name.to_string(),
            location: location.to_string(),
        });
        id
    }

    /// Insert a dish directly and return its id.
    pub fn seed_dish(&self, restaurant_id: i64, name: &str, price: f64) -> i64 {
        let mut state = lock(&self.state);
        let id = state.allocate_id();
        state.dishes.push(StoredDish {
            id,
            restaurant_id,
            name: name.to_string(),
            price,
        });
        id
    }
}

/// Known user ids.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashSet<i64>>,
}

impl MemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().collect()),
        }
    }

    pub fn remove(&self, user_id: i64) {
        lock(&self.users).remove(&user_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn exists(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(lock(&self.users).contains(&user_id))
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError> {
        if self.faults().fail_begin {
            return Err(CatalogError::Rejected("connection refused".to_string()));
        }
        Ok(Box::new(MemoryTransaction {
            working: self.snapshot(),
            touched_restaurants: Vec::new(),
            touched_dishes: Vec::new(),
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
        }))
    }
}

impl CatalogSnapshot {
    fn listed(&self, restaurant: &StoredRestaurant) -> Restaurant {
        Restaurant {
            id: restaurant.id,
            name: restaurant.name.clone(),
            location: restaurant.location.clone(),
            dish_count: self
                .dishes
                .iter()
                .filter(|d| d.restaurant_id == restaurant.id)
                .count() as i64,
        }
    }
}

impl From<&StoredDish> for Dish {
    fn from(dish: &StoredDish) -> Self {
        Dish {
            id: dish.id,
            restaurant_id: dish.restaurant_id,
            name: dish.name.clone(),
            price: dish.price,
        }
    }
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn list_restaurants(
        &self,
        query: &RestaurantQuery,
    ) -> Result<RestaurantList, CatalogError> {
        let state = lock(&self.state);
        let needle = query.search_term().map(str::to_lowercase);
        let mut matching: Vec<&StoredRestaurant> = state
            .restaurants
            .iter()
            .filter(|r| {
                needle
                    .as_deref()
                    .map_or(true, |n| r.name.to_lowercase().contains(n))
            })
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(RestaurantList::new(
            matching.into_iter().map(|r| state.listed(r)).collect(),
        ))
    }

    async fn restaurant_detail(&self, id: i64) -> Result<Option<RestaurantDetail>, CatalogError> {
        let state = lock(&self.state);
        let Some(restaurant) = state.restaurants.iter().find(|r| r.id == id) else {
            return Ok(None);
        };
        let mut dishes: Vec<Dish> = state
            .dishes
            .iter()
            .filter(|d| d.restaurant_id == id)
            .map(Dish::from)
            .collect();
        dishes.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(RestaurantDetail {
            restaurant: state.listed(restaurant),
            dishes,
        }))
    }

    async fn dish_detail(&self, id: i64) -> Result<Option<DishDetail>, CatalogError> {
        let state = lock(&self.state);
        let Some(dish) = state.dishes.iter().find(|d| d.id == id) else {
            return Ok(None);
        };
        let Some(restaurant) = state.restaurants.iter().find(|r| r.id == dish.restaurant_id)
        else {
            return Ok(None);
        };

        Ok(Some(DishDetail {
            dish: Dish::from(dish),
            restaurant: RestaurantRef {
                id: restaurant.id,
                name: restaurant.name.clone(),
                location: restaurant.location.clone(),
            },
        }))
    }
}

/// Works on a private copy of the catalog. Commit merges only the rows this
/// transaction wrote into the shared catalog, keyed the way the database
/// unique constraints are, so concurrent transactions do not overwrite each
/// other. New ids come from the shared counter.
struct MemoryTransaction {
    working: CatalogSnapshot,
    touched_restaurants: Vec<i64>,
    touched_dishes: Vec<i64>,
    state: Arc<Mutex<CatalogSnapshot>>,
    faults: Arc<Mutex<CatalogFaults>>,
}

fn touch(ids: &mut Vec<i64>, id: i64) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn upsert_restaurant(
        &mut self,
        name: &str,
        location: &str,
    ) -> Result<i64, CatalogError> {
        if lock(&self.faults).fail_restaurant_upsert {
            return Err(CatalogError::Rejected("restaurant upsert failed".to_string()));
        }
        if let Some(existing) = self
            .working
            .restaurants
            .iter_mut()
            .find(|r| r.name == name && r.location == location)
        {
            existing.name = name.to_string();
            let id = existing.id;
            touch(&mut self.touched_restaurants, id);
            return Ok(id);
        }
        let id = lock(&self.state).allocate_id();
        self.working.restaurants.push(StoredRestaurant {
            id,
            name: name.to_string(),
            location: location.to_string(),
        });
        touch(&mut self.touched_restaurants, id);
        Ok(id)
    }

    async fn find_restaurant_by_name(&mut self, name: &str) -> Result<Option<i64>, CatalogError> {
        if lock(&self.faults).fail_restaurant_lookup {
            return Err(CatalogError::Rejected("restaurant lookup failed".to_string()));
        }
        Ok(self
            .working
            .restaurants
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.id)
            .min())
    }

    async fn upsert_dish(
        &mut self,
        restaurant_id: i64,
        name: &str,
        price: f64,
    ) -> Result<DishWrite, CatalogError> {
        if lock(&self.faults).failing_dishes.contains(name) {
            return Err(CatalogError::Rejected(format!("dish {name} rejected")));
        }
        if let Some(existing) = self
            .working
            .dishes
            .iter_mut()
            .find(|d| d.restaurant_id == restaurant_id && d.name == name)
        {
            existing.price = price;
            let id = existing.id;
            touch(&mut self.touched_dishes, id);
            return Ok(DishWrite::Updated);
        }
        if !self.working.restaurants.iter().any(|r| r.id == restaurant_id) {
            return Err(CatalogError::Rejected(format!(
                "restaurant {restaurant_id} does not exist"
            )));
        }
        let id = lock(&self.state).allocate_id();
        self.working.dishes.push(StoredDish {
            id,
            restaurant_id,
            name: name.to_string(),
            price,
        });
        touch(&mut self.touched_dishes, id);
        Ok(DishWrite::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), CatalogError> {
        if lock(&self.faults).fail_commit {
            return Err(CatalogError::Rejected("commit failed".to_string()));
        }
        let MemoryTransaction {
            working,
            touched_restaurants,
            touched_dishes,
            state,
            ..
        } = *self;
        let mut shared = lock(&state);

        // Restaurants another transaction committed first keep their id.
        let mut remapped = HashMap::new();
        for id in touched_restaurants {
            let Some(written) = working.restaurants.iter().find(|r| r.id == id) else {
                continue;
            };
            match shared
                .restaurants
                .iter_mut()
                .find(|r| r.name == written.name && r.location == written.location)
            {
                Some(existing) => {
                    existing.name = written.name.clone();
                    remapped.insert(written.id, existing.id);
                }
                None => shared.restaurants.push(written.clone()),
            }
        }

        for id in touched_dishes {
            let Some(written) = working.dishes.iter().find(|d| d.id == id) else {
                continue;
            };
            let restaurant_id = remapped
                .get(&written.restaurant_id)
                .copied()
                .unwrap_or(written.restaurant_id);
            match shared
                .dishes
                .iter_mut()
                .find(|d| d.restaurant_id == restaurant_id && d.name == written.name)
            {
                Some(existing) => existing.price = written.price,
                None => shared.dishes.push(StoredDish {
                    restaurant_id,
                    ..written.clone()
                }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overlapping_transactions_both_survive_commit() {
        let catalog = MemoryCatalog::new();
        let shared = catalog.seed_restaurant("Joe's", "1");

        let mut first = catalog.begin().await.unwrap();
        let mut second = catalog.begin().await.unwrap();

        first.upsert_dish(shared, "Rice", 8.0).await.unwrap();
        let grill = first.upsert_restaurant("Grill", "2").await.unwrap();
        first.upsert_dish(grill, "Steak", 30.0).await.unwrap();

        second.upsert_dish(shared, "Soup", 5.0).await.unwrap();
        let noodles = second.upsert_restaurant("Noodle Bar", "3").await.unwrap();
        assert_ne!(grill, noodles);

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let snapshot = catalog.snapshot();
        let mut restaurants: Vec<_> = snapshot.restaurants.iter().map(|r| r.name.as_str()).collect();
        restaurants.sort_unstable();
        assert_eq!(restaurants, vec!["Grill", "Joe's", "Noodle Bar"]);
        let mut dishes: Vec<_> = snapshot.dishes.iter().map(|d| d.name.as_str()).collect();
        dishes.sort_unstable();
        assert_eq!(dishes, vec!["Rice", "Soup", "Steak"]);
    }

    #[tokio::test]
    async fn test_concurrent_insert_of_same_restaurant_keeps_first_id() {
        let catalog = MemoryCatalog::new();

        let mut first = catalog.begin().await.unwrap();
        let mut second = catalog.begin().await.unwrap();
        let first_id = first.upsert_restaurant("Joe's", "1").await.unwrap();
        let second_id = second.upsert_restaurant("Joe's", "1").await.unwrap();
        second.upsert_dish(second_id, "Rice", 8.0).await.unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let snapshot = catalog.snapshot();
        assert_eq!(snapshot.restaurants.len(), 1);
        assert_eq!(snapshot.restaurants[0].id, first_id);
        assert_eq!(snapshot.dishes[0].restaurant_id, first_id);
    }
}
