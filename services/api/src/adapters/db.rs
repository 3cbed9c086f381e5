//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete `StudyStore` that sits
//! behind the CRUD service. It keeps every study as a JSON document in SQLite
//! using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use research_interview_core::domain::Study;
use research_interview_core::ports::{Clock, PortError, PortResult, StudyStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `StudyStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Opens a connection pool for `database_url`.
    pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct StudyRecord {
    id: String,
    json: String,
}

impl StudyRecord {
    fn to_domain(self) -> PortResult<Study> {
        serde_json::from_str(&self.json).map_err(|e| {
            PortError::Unexpected(format!("Stored study {} is unreadable: {}", self.id, e))
        })
    }
}

fn backend_error(e: sqlx::Error) -> PortError {
    PortError::BackendUnavailable(e.to_string())
}

//=========================================================================================
// `StudyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyStore for DbAdapter {
    async fn load_all(&self) -> PortResult<Vec<Study>> {
        let records = sqlx::query_as::<_, StudyRecord>(
            "SELECT id, json FROM studies ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        records.into_iter().map(StudyRecord::to_domain).collect()
    }

    async fn load(&self, id: &str) -> PortResult<Option<Study>> {
        let record = sqlx::query_as::<_, StudyRecord>("SELECT id, json FROM studies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        record.map(StudyRecord::to_domain).transpose()
    }

    async fn save(&self, study: &Study) -> PortResult<()> {
        let previous: Option<i64> =
            sqlx::query_scalar("SELECT updated_at FROM studies WHERE id = ?")
                .bind(&study.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend_error)?;

        let mut stored = study.clone();
        stored.updated_at = self.clock.now();
        // updated_at never moves backwards, even if the clock does.
        if let Some(previous) = previous.and_then(DateTime::<Utc>::from_timestamp_millis) {
            stored.updated_at = stored.updated_at.max(previous);
        }

        let json =
            serde_json::to_string(&stored).map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query(
            "INSERT INTO studies (id, json, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
        )
        .bind(&stored.id)
        .bind(json)
        .bind(stored.created_at.timestamp_millis())
        .bind(stored.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM studies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
