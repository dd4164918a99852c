use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{
    auth::TokenKeys, catalog::CatalogReader, orchestrator::JobOrchestrator,
    storage::UploadStorage, users::UserDirectory,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<UploadStorage>,
    pub auth: Arc<TokenKeys>,
    pub users: Arc<dyn UserDirectory>,
    pub catalog: Arc<dyn CatalogReader>,
    pub jobs: JobOrchestrator,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: UploadStorage,
        auth: TokenKeys,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogReader>,
        jobs: JobOrchestrator,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            auth: Arc::new(auth),
            users,
            catalog,
            jobs,
        }
    }
}
