use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Acquire, PgConnection, PgPool, Postgres, Row, Transaction};

use crate::models::catalog::{
    Dish, DishDetail, Restaurant, RestaurantDetail, RestaurantList, RestaurantQuery,
    RestaurantRef,
};
use crate::services::catalog::{
    CatalogError, CatalogReader, CatalogStore, CatalogTransaction, DishWrite,
};

/// Restaurant/dish catalog backed by PostgreSQL.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTransaction { tx }))
    }
}

/// A catalog transaction. Every write runs inside a savepoint so that a
/// failed statement does not abort the surrounding transaction.
pub struct PgCatalogTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTransaction for PgCatalogTransaction {
    async fn upsert_restaurant(
        &mut self,
        name: &str,
        location: &str,
    ) -> Result<i64, CatalogError> {
        let mut savepoint = Acquire::begin(&mut self.tx).await?;

        let upserted = sqlx::query(
            r#"
            INSERT INTO restaurants (name, location)
            VALUES ($1, $2)
            ON CONFLICT (name, location) DO UPDATE SET
                name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(location)
        .fetch_one(&mut *savepoint)
        .await
        .and_then(|row| row.try_get::<i64, _>("id"));

        match upserted {
            Ok(id) => {
                savepoint.commit().await?;
                Ok(id)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn find_restaurant_by_name(&mut self, name: &str) -> Result<Option<i64>, CatalogError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM restaurants
            WHERE name = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn upsert_dish(
        &mut self,
        restaurant_id: i64,
        name: &str,
        price: f64,
    ) -> Result<DishWrite, CatalogError> {
        let mut savepoint = Acquire::begin(&mut self.tx).await?;

        match write_dish(&mut savepoint, restaurant_id, name, price).await {
            Ok(write) => {
                savepoint.commit().await?;
                Ok(write)
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), CatalogError> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn write_dish(
    conn: &mut PgConnection,
    restaurant_id: i64,
    name: &str,
    price: f64,
) -> Result<DishWrite, sqlx::Error> {
    let updated = sqlx::query(
        r#"
        UPDATE dishes
        SET price = $3,
            updated_at = NOW()
        WHERE restaurant_id = $1 AND name = $2
        "#,
    )
    .bind(restaurant_id)
    .bind(name)
    .bind(price)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() > 0 {
        return Ok(DishWrite::Updated);
    }

    sqlx::query(
        r#"
        INSERT INTO dishes (restaurant_id, name, price)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(restaurant_id)
    .bind(name)
    .bind(price)
    .execute(&mut *conn)
    .await?;

    Ok(DishWrite::Inserted)
}

const RESTAURANT_COLUMNS: &str = r#"
    r.id, r.name, r.location,
    (SELECT COUNT(*) FROM dishes d WHERE d.restaurant_id = r.id) AS dish_count
"#;

fn restaurant_from_row(row: &PgRow) -> Result<Restaurant, sqlx::Error> {
    Ok(Restaurant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        dish_count: row.try_get("dish_count")?,
    })
}

fn dish_from_row(row: &PgRow) -> Result<Dish, sqlx::Error> {
    Ok(Dish {
        id: row.try_get("id")?,
        restaurant_id: row.try_get("restaurant_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

#[async_trait]
impl CatalogReader for PgCatalog {
    async fn list_restaurants(
        &self,
        query: &RestaurantQuery,
    ) -> Result<RestaurantList, CatalogError> {
        // NULL lists everything. LIKE wildcards in the term match literally.
        let pattern = query.search_term().map(|term| {
            let escaped = term
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        });

        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESTAURANT_COLUMNS}
            FROM restaurants r
            WHERE $1::TEXT IS NULL OR r.name ILIKE $1
            ORDER BY r.name ASC, r.id ASC
            "#
        ))
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        let restaurants = rows
            .iter()
            .map(restaurant_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RestaurantList::new(restaurants))
    }

    async fn restaurant_detail(&self, id: i64) -> Result<Option<RestaurantDetail>, CatalogError> {
        let Some(row) = sqlx::query(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let restaurant = restaurant_from_row(&row)?;

        let dishes = sqlx::query(
            r#"
            SELECT id, restaurant_id, name, price
            FROM dishes
            WHERE restaurant_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(dish_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RestaurantDetail { restaurant, dishes }))
    }

    async fn dish_detail(&self, id: i64) -> Result<Option<DishDetail>, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT d.id, d.restaurant_id, d.name, d.price,
                   r.name AS restaurant_name, r.location AS restaurant_location
            FROM dishes d
            JOIN restaurants r ON r.id = d.restaurant_id
            WHERE d.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let dish = dish_from_row(&row)?;
        let restaurant = RestaurantRef {
            id: dish.restaurant_id,
            name: row.try_get("restaurant_name")?,
            location: row.try_get("restaurant_location")?,
        };

        Ok(Some(DishDetail { dish, restaurant }))
    }
}
