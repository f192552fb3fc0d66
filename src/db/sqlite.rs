use crate::db::schema::{METRIC_SEED, SQLITE_INIT};
use crate::error::EverwellError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Typed access to every EverWell table. Per-table queries live in sibling
/// modules as further `impl Storage` blocks.
#[derive(Clone)]
pub struct Storage {
    pub(super) pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open (creating if needed) the database, then apply schema and seed data.
    pub async fn connect(database_url: &str) -> Result<Self, EverwellError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        ensure_parent_dir(connect_opts.get_filename())?;

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        storage.seed_metric_definitions().await?;
        info!(database_url = %database_url, "database ready");
        Ok(storage)
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), EverwellError> {
        // execute statements one by one (sqlx::query runs a single statement)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upsert the built-in metric catalogue so edits to it apply on restart.
    pub async fn seed_metric_definitions(&self) -> Result<(), EverwellError> {
        let mut tx = self.pool.begin().await?;
        for (position, (slug, name, unit, min, max, decimals, description)) in
            METRIC_SEED.iter().enumerate()
        {
            sqlx::query(
                r#"
                INSERT INTO metric_definitions (
                    slug, name, unit, min_value, max_value, decimals, description, position
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(slug) DO UPDATE SET
                    name=excluded.name,
                    unit=excluded.unit,
                    min_value=excluded.min_value,
                    max_value=excluded.max_value,
                    decimals=excluded.decimals,
                    description=excluded.description,
                    position=excluded.position
                "#,
            )
            .bind(*slug)
            .bind(*name)
            .bind(*unit)
            .bind(*min)
            .bind(*max)
            .bind(*decimals)
            .bind(*description)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Round-trip used by the health endpoint.
    pub async fn ping(&self) -> Result<(), EverwellError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn ensure_parent_dir(db_file: &Path) -> Result<(), EverwellError> {
    if db_file.as_os_str() == ":memory:" {
        return Ok(());
    }
    match db_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
