//! Postgres + pgvector embedding store
//!
//! Uses raw statements through SeaORM; vectors are passed as `'[..]'::vector`
//! literals built from the float values.

use super::{ScoredRecord, VectorRecord, VectorStore};
use crate::config::VectorStoreConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use regex_lite::Regex;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, QueryResult,
    Statement,
};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Collection backed by one pgvector table
pub struct PgVectorStore {
    conn: DatabaseConnection,
    table: String,
    dimension: usize,
    query_timeout: Duration,
}

impl PgVectorStore {
    /// Connect and create the collection table when missing
    #[instrument(skip(config), fields(collection = %config.collection))]
    pub async fn connect(config: &VectorStoreConfig, dimension: usize) -> Result<Self> {
        let uri = config
            .uri
            .as_deref()
            .ok_or_else(|| AppError::config("vector_store.uri is required for pgvector"))?;
        validate_identifier(&config.collection)?;

        let mut opts = ConnectOptions::new(uri);
        opts.max_connections(config.max_connections)
            .connect_timeout(config.connect_timeout())
            .sqlx_logging(false);

        info!("Connecting to vector store...");
        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::StoreUnavailable {
                message: format!("Failed to connect: {}", e),
            })?;

        let store = Self {
            conn,
            table: config.collection.clone(),
            dimension,
            query_timeout: config.query_timeout(),
        };
        store.ensure_collection().await?;
        info!(table = %store.table, dimension, "Vector store ready");
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                vector vector({dimension}) NOT NULL,
                attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb
            )
            "#,
            table = self.table,
            dimension = self.dimension
        );

        self.bounded(self.conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector"))
            .await?;
        self.bounded(self.conn.execute_unprepared(&ddl)).await?;
        Ok(())
    }

    /// Bound one statement by the query timeout
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sea_orm::DbErr>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::StoreUnavailable {
                message: format!("statement timed out after {:?}", self.query_timeout),
            }),
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

/// Collection names are interpolated into SQL, so only plain identifiers pass
fn validate_identifier(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|e| AppError::Other(anyhow::anyhow!(e)))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "collection name '{}' is not a valid SQL identifier",
            name
        )))
    }
}

fn vector_literal(vector: &[f32]) -> String {
    format!(
        "[{}]",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| AppError::integrity(format!("unreadable stored vector: {}", e)))
        })
        .collect()
}

fn scored_from_row(row: &QueryResult) -> Result<ScoredRecord> {
    let id: String = row.try_get("", "id")?;
    let text: String = row.try_get("", "text")?;
    let vector: String = row.try_get("", "vector_text")?;
    let attributes: String = row.try_get("", "attributes_text")?;
    let score: f64 = row.try_get("", "score")?;

    Ok(ScoredRecord {
        record: VectorRecord {
            id,
            text,
            vector: parse_vector(&vector)?,
            attributes: serde_json::from_str(&attributes)?,
        },
        score: score as f32,
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            self.check_dimension(record.vector.len())?;
        }

        for record in records {
            let sql = format!(
                r#"
                INSERT INTO {table} (id, text, vector, attributes)
                VALUES ($1, $2, '{vector}'::vector, $3::jsonb)
                ON CONFLICT (id) DO UPDATE
                SET text = EXCLUDED.text,
                    vector = EXCLUDED.vector,
                    attributes = EXCLUDED.attributes
                "#,
                table = self.table,
                vector = vector_literal(&record.vector)
            );

            self.bounded(self.conn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![
                    record.id.clone().into(),
                    record.text.clone().into(),
                    record.attributes.to_string().into(),
                ],
            )))
            .await?;
        }

        debug!("Upsert complete");
        Ok(())
    }

    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_dimension(query.len())?;
        let start = Instant::now();

        let sql = format!(
            r#"
            SELECT
                id,
                text,
                vector::text AS vector_text,
                attributes::text AS attributes_text,
                (1 - (vector <=> '{embedding}'::vector))::float8 AS score
            FROM {table}
            ORDER BY vector <=> '{embedding}'::vector, id
            LIMIT $1
            "#,
            embedding = vector_literal(query),
            table = self.table
        );

        let rows = self
            .bounded(self.conn.query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![i64::try_from(k).unwrap_or(i64::MAX).into()],
            )))
            .await?;

        metrics::record_vector_query(self.name(), start.elapsed().as_secs_f64());
        rows.iter().map(scored_from_row).collect()
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("entity_description_embeddings").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("drop table x;--").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_vector_literal_parse() {
        let literal = vector_literal(&[0.5, -1.0, 2.25]);
        assert_eq!(literal, "[0.5,-1,2.25]");
        assert_eq!(parse_vector(&literal).unwrap(), vec![0.5, -1.0, 2.25]);
        assert!(parse_vector("[]").unwrap().is_empty());
        assert!(parse_vector("[a,b]").is_err());
    }

    #[tokio::test]
    async fn test_pgvector_requires_uri() {
        let err = PgVectorStore::connect(&VectorStoreConfig::default(), 3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
