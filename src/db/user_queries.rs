use async_trait::async_trait;
use sqlx::PgPool;

use crate::services::store::StoreError;
use crate::services::users::UserDirectory;

/// Accounts in the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn exists(&self, user_id: i64) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }
}
