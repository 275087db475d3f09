use std::sync::Arc;

use diesel::{
    r2d2::{ConnectionManager, PooledConnection},
    sqlite::SqliteConnection,
};

use crate::{
    attachments::AttachmentStore,
    config::AppConfig,
    db::SqlitePool,
    error::{AppError, AppResult},
    search::SearchFilter,
};

/// Connection scoped to one request; returned to the pool on drop.
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AttachmentStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, store: Arc<dyn AttachmentStore>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            store,
        }
    }

    pub fn db(&self) -> AppResult<DbConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn search_filter(&self, query: impl Into<String>) -> SearchFilter {
        SearchFilter::new(query, self.config.search_mode)
    }
}
