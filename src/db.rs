use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};
use tracing::{debug, warn};

use crate::config::DATABASE_URL_VAR;
use crate::error::{ConfigError, StoreError};

/// Hands out one pooled connection per operation. The connection goes back
/// to the pool when the operation finishes, whether it succeeded, failed or
/// panicked.
#[derive(Clone)]
pub struct ConnectionScope {
    pool: Option<SqlitePool>,
}

impl ConnectionScope {
    /// Builds the pool without opening a connection; the first operation
    /// connects and creates the database file if it is missing. `None`
    /// yields a scope that rejects every operation.
    pub fn new(database_url: Option<&str>) -> Result<Self, StoreError> {
        let Some(url) = database_url else {
            warn!("{} is not set, comments are disabled", DATABASE_URL_VAR);
            return Ok(Self::unconfigured());
        };

        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::ConnectionFailed)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);

        Ok(Self { pool: Some(pool) })
    }

    pub fn unconfigured() -> Self {
        Self { pool: None }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    pub async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or(ConfigError::MissingDatabaseUrl(DATABASE_URL_VAR))?;

        let mut conn = pool.acquire().await.map_err(|e| {
            warn!("Failed to acquire database connection: {}", e);
            StoreError::ConnectionFailed(e)
        })?;
        debug!("Acquired database connection");

        let result = op(&mut *conn).await;
        drop(conn);
        debug!("Released database connection");

        result.map_err(StoreError::from)
    }

    /// Closes the pool; later operations fail with `ConnectionFailed`.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
