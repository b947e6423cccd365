//! Store access layer over SQLite
//!
//! Thin operations the parsers and the reconciliation engine call. Two
//! insert policies coexist deliberately: the dimension tables (class, food,
//! biospecimen, category) upsert on their unique name and return the
//! existing id on conflict, while compound inserts treat a duplicate
//! natural key as a hard error surfaced to the caller.

mod schema;

pub use schema::SCHEMA_SQL;

use crate::error::{Error, Result};
use crate::parse::{ConcentrationRow, FoodValues, ReferenceRow};
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use tracing::{debug, info};

/// Sentinel category foods fall under when the catalog listing never
/// supplied one
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

/// Database handle
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database and initialize the schema
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the schema and the sentinel category
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        self.upsert_food_category(UNKNOWN_CATEGORY).await?;
        Ok(())
    }

    /// Begin a transaction for one logical unit of work
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Check out a plain auto-commit connection
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    // ===== Conflict-tolerant dimension upserts =====

    /// Upsert a food category by unique name, returning its id
    pub async fn upsert_food_category(&self, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO food_category (name) VALUES (?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Upsert a compound class by unique name, returning its id
    pub async fn upsert_class(&self, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO compound_class (name) VALUES (?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Upsert a biospecimen by unique name, returning its id
    pub async fn upsert_biospecimen(&self, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO biospecimen (name) VALUES (?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Upsert a food by unique name, returning its id. The category of an
    /// already-present food is left untouched.
    pub async fn upsert_food(&self, category_id: i64, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO food (category_id, name) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(category_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    // ===== Compound operations (conflict-fatal) =====

    /// Insert a compound row. A unique violation on name or either natural
    /// key surfaces as [`Error::DuplicateCompound`].
    pub async fn insert_compound(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        class_id: Option<i64>,
        foodb_id: Option<&str>,
        hmdb_id: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO compound (class_id, name, foodb_id, hmdb_id)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(class_id)
        .bind(name)
        .bind(foodb_id)
        .bind(hmdb_id)
        .fetch_one(&mut *conn)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::DuplicateCompound {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a compound by its unique name, returning the surrogate id
    /// and any stored FooDB natural key
    pub async fn find_compound_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(i64, Option<String>)>> {
        let row = sqlx::query_as("SELECT id, foodb_id FROM compound WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Look up a compound id by its FooDB natural key
    pub async fn find_compound_by_foodb_id(&self, foodb_id: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM compound WHERE foodb_id = ?")
            .bind(foodb_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Attach or overwrite the HMDB natural key on an existing compound
    pub async fn set_hmdb_id(&self, compound_id: i64, hmdb_id: &str) -> Result<()> {
        sqlx::query("UPDATE compound SET hmdb_id = ? WHERE id = ?")
            .bind(hmdb_id)
            .bind(compound_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Link and observation inserts =====

    /// Look up a food id by its unique name
    pub async fn find_food_by_name(&self, name: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM food WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Insert one compound-food link with its observed values
    pub async fn insert_food_compound(
        &self,
        conn: &mut SqliteConnection,
        compound_id: i64,
        food_id: i64,
        values: &FoodValues,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO food_compounds (compound_id, food_id, average_value, max_value, min_value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(compound_id)
        .bind(food_id)
        .bind(values.average)
        .bind(values.max)
        .bind(values.min)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Insert one compound-biospecimen link
    pub async fn insert_compound_biospecimen(
        &self,
        compound_id: i64,
        biospecimen_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO compound_biospecimens (compound_id, biospecimen_id) VALUES (?, ?)",
        )
        .bind(compound_id)
        .bind(biospecimen_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a concentration row, returning its id. Absent optional fields
    /// persist as NULL; the column list never varies.
    pub async fn insert_concentration(
        &self,
        conn: &mut SqliteConnection,
        compound_id: i64,
        biospecimen_id: i64,
        units: &str,
        row: &ConcentrationRow,
    ) -> Result<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO concentration
                (compound_id, biospecimen_id, value, units, age, sex, condition, comment)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(compound_id)
        .bind(biospecimen_id)
        .bind(&row.value)
        .bind(units)
        .bind(row.age.as_deref())
        .bind(row.sex.as_deref())
        .bind(row.condition.as_deref())
        .bind(row.comment.as_deref())
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Insert one reference row for a concentration
    pub async fn insert_reference(
        &self,
        conn: &mut SqliteConnection,
        concentration_id: i64,
        reference: &ReferenceRow,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO reference (concentration_id, reference_text, pubmed_id) VALUES (?, ?, ?)",
        )
        .bind(concentration_id)
        .bind(reference.reference_text.as_deref())
        .bind(reference.pubmed_id.as_deref())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // ===== Memo cache preloads =====

    pub async fn load_classes(&self) -> Result<Vec<(i64, String)>> {
        Ok(sqlx::query_as("SELECT id, name FROM compound_class")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn load_foods(&self) -> Result<Vec<(i64, String)>> {
        Ok(sqlx::query_as("SELECT id, name FROM food")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn load_biospecimens(&self) -> Result<Vec<(i64, String)>> {
        Ok(sqlx::query_as("SELECT id, name FROM biospecimen")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn load_food_categories(&self) -> Result<Vec<(i64, String)>> {
        Ok(sqlx::query_as("SELECT id, name FROM food_category")
            .fetch_all(&self.pool)
            .await?)
    }

    // ===== Crawl-state marker =====

    /// Record that a source catalog finished crawling
    pub async fn mark_crawl_complete(&self, source: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_state (source, completed_at) VALUES (?, ?)
            ON CONFLICT(source) DO UPDATE SET completed_at = excluded.completed_at
            "#,
        )
        .bind(source)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether a source catalog has a recorded completion
    pub async fn crawl_completed(&self, source: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM crawl_state WHERE source = ?")
            .bind(source)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
