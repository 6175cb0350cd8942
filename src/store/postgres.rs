//! PostgreSQL session store
//!
//! One row per session:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sessions (
//!     id             TEXT PRIMARY KEY,
//!     created_at     TIMESTAMPTZ NOT NULL,
//!     updated_at     TIMESTAMPTZ NOT NULL,
//!     expires_at     BIGINT NULL,
//!     data           JSONB NOT NULL,
//!     client_address TEXT NULL,
//!     user_agent     TEXT NOT NULL
//! );
//! ```
//!
//! `expires_at` holds epoch milliseconds, using the same encoding as the JSON
//! form of a record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;

use super::{IdGenerator, SessionStore};
use crate::config::default_id_generator;
use crate::error::SessionError;
use crate::record::{Expiry, SessionData, SessionMetadata, SessionRecord};
use crate::token::is_valid_session_id;

/// PostgreSQL session store backed by a `PgPool`
pub struct PostgresStore {
    pool: PgPool,
    table: String,
    id_generator: IdGenerator,
}

impl PostgresStore {
    /// Create a store on an existing pool, using the `sessions` table
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: "sessions".to_string(),
            id_generator: default_id_generator(),
        }
    }

    /// Connect a new pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, SessionError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Use a different table, optionally schema-qualified (`schema.table`)
    pub fn with_table(mut self, table: &str) -> Result<Self, SessionError> {
        let valid = !table.is_empty()
            && table.split('.').count() <= 2
            && table.split('.').all(|part| {
                !part.is_empty()
                    && !part.starts_with(|c: char| c.is_ascii_digit())
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(SessionError::InvalidData(format!(
                "invalid table name: {}",
                table
            )));
        }
        self.table = table.to_string();
        Ok(self)
    }

    /// Borrow the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the sessions table if it does not exist
    pub async fn migrate(&self) -> Result<(), SessionError> {
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
                   id TEXT PRIMARY KEY,
                   created_at TIMESTAMPTZ NOT NULL,
                   updated_at TIMESTAMPTZ NOT NULL,
                   expires_at BIGINT NULL,
                   data JSONB NOT NULL,
                   client_address TEXT NULL,
                   user_agent TEXT NOT NULL
               )"#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<SessionRecord, SessionError> {
        let Json(data): Json<SessionData> = row.try_get("data")?;
        Ok(SessionRecord {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: Expiry::from_epoch_millis(row.try_get("expires_at")?)?,
            data,
            metadata: SessionMetadata {
                client_address: row.try_get("client_address")?,
                user_agent: row.try_get("user_agent")?,
            },
        })
    }

    async fn upsert(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError> {
        sqlx::query(&format!(
            r#"INSERT INTO {}
                   (id, created_at, updated_at, expires_at, data, client_address, user_agent)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id)
               DO UPDATE SET
                   updated_at = EXCLUDED.updated_at,
                   expires_at = EXCLUDED.expires_at,
                   data = EXCLUDED.data,
                   client_address = EXCLUDED.client_address,
                   user_agent = EXCLUDED.user_agent"#,
            self.table
        ))
        .bind(id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.expires_at.to_epoch_millis())
        .bind(Json(&record.data))
        .bind(&record.metadata.client_address)
        .bind(&record.metadata.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl Clone for PostgresStore {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table.clone(),
            id_generator: Arc::clone(&self.id_generator),
        }
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    fn set_id_generator(&mut self, generator: IdGenerator) {
        self.id_generator = generator;
    }

    async fn create(
        &self,
        data: SessionData,
        expires_at: Option<DateTime<Utc>>,
        metadata: SessionMetadata,
    ) -> Result<SessionRecord, SessionError> {
        let id = (self.id_generator)();
        if !is_valid_session_id(&id) {
            return Err(SessionError::InvalidSessionId(id));
        }

        let expires_at = expires_at.map_or(Expiry::Never, Expiry::At);
        let record = SessionRecord::new(id.clone(), data, expires_at, metadata, Utc::now());

        let inserted = sqlx::query(&format!(
            r#"INSERT INTO {}
                   (id, created_at, updated_at, expires_at, data, client_address, user_agent)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO NOTHING"#,
            self.table
        ))
        .bind(&record.id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.expires_at.to_epoch_millis())
        .bind(Json(&record.data))
        .bind(&record.metadata.client_address)
        .bind(&record.metadata.user_agent)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(SessionError::CreateFailure(format!(
                "session id already in use: {}",
                id
            )));
        }
        tracing::trace!(session_id = %id, "created session");
        Ok(record)
    }

    async fn read(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            r#"SELECT id, created_at, updated_at, expires_at, data, client_address, user_agent
               FROM {}
               WHERE id = $1"#,
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn update(&self, id: &str, record: &SessionRecord) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }

        match self.upsert(id, record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to update session: {}", e);
                false
            }
        }
    }

    async fn delete(&self, id: &str) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to delete session: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Tests require a running PostgreSQL instance
    // Run with: DATABASE_URL=postgres://... cargo test --features postgres-store -- --ignored

    use super::*;

    #[tokio::test]
    async fn test_table_name_validation() {
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap();
        let store = PostgresStore::new(pool);
        assert!(store.clone().with_table("app.sessions").is_ok());
        assert!(store.clone().with_table("sessions_v2").is_ok());
        assert!(store.clone().with_table("sessions; DROP TABLE x").is_err());
        assert!(store.clone().with_table("a.b.c").is_err());
        assert!(store.with_table("1sessions").is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgres_store_basic() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PostgresStore::connect(&url, 2)
            .await
            .unwrap()
            .with_table("test_sessions")
            .unwrap();
        store.migrate().await.unwrap();

        let mut data = SessionData::new();
        data.set("user", "alice");
        let created = store
            .create(data.clone(), None, SessionMetadata::default())
            .await
            .unwrap();

        let retrieved = store.read(&created.id).await.unwrap().unwrap();
        assert_eq!(retrieved.data, data);
        assert_eq!(retrieved.expires_at, Expiry::Never);

        let mut changed = retrieved.clone();
        changed.data.set("user", "bob");
        assert!(store.update(&created.id, &changed).await);
        let retrieved = store.read(&created.id).await.unwrap().unwrap();
        assert_eq!(retrieved.data.get::<String>("user").as_deref(), Some("bob"));

        assert!(store.delete(&created.id).await);
        assert!(store.read(&created.id).await.unwrap().is_none());
    }
}
