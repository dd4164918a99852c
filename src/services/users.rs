use async_trait::async_trait;

use crate::services::store::StoreError;

/// Lookup of registered accounts. A signed token only authenticates its
/// subject while that user still exists.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: i64) -> Result<bool, StoreError>;
}
