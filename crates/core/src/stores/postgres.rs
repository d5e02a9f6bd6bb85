use crate::error::StoreError;
use crate::models::{MetadataId, SimilarDocument};
use crate::traits::DocumentSession;
use async_trait::async_trait;
use chrono::NaiveDate;
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl PgConfig {
    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

fn schema_statements(dimensions: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        "CREATE TABLE IF NOT EXISTS metadata (
            id SERIAL PRIMARY KEY,
            title VARCHAR(255) NOT NULL,
            upload_date DATE
        )"
        .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS content (
                id SERIAL PRIMARY KEY,
                metadata_id INTEGER REFERENCES metadata(id) ON DELETE CASCADE,
                chunk_text TEXT NOT NULL,
                embedding VECTOR({dimensions})
            )"
        ),
        "CREATE INDEX IF NOT EXISTS idx_content_embedding_hnsw
            ON content USING hnsw (embedding vector_cosine_ops)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_metadata_title_lower ON metadata (lower(title))"
            .to_string(),
    ]
}

/// Postgres + pgvector session over a single pooled connection.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    pub async fn connect(config: &PgConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(config.connect_options())
            .await
            .map_err(StoreError::Connection)?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connected to postgres"
        );

        Ok(Self { pool, tx: None })
    }

    fn connection(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::NoTransaction)
    }
}

#[async_trait]
impl DocumentSession for PgSession {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::TransactionAlreadyOpen);
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn create_schema(&mut self, dimensions: usize) -> Result<(), StoreError> {
        for statement in schema_statements(dimensions) {
            sqlx::query(&statement).execute(self.connection()?).await?;
        }
        debug!(dimensions, "schema ensured");
        Ok(())
    }

    async fn delete_all(&mut self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM metadata")
            .execute(self.connection()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_title(&mut self, title: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM metadata WHERE lower(title) = lower($1)")
            .bind(title)
            .execute(self.connection()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn nearest_within(
        &mut self,
        embedding: &[f32],
        max_distance: f64,
    ) -> Result<Option<SimilarDocument>, StoreError> {
        let row: Option<(i32, f64)> = sqlx::query_as(
            "SELECT metadata_id, embedding <=> $1 AS distance
             FROM content
             WHERE metadata_id IS NOT NULL AND embedding <=> $1 < $2
             ORDER BY distance
             LIMIT 1",
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(max_distance)
        .fetch_optional(self.connection()?)
        .await?;

        Ok(row.map(|(metadata_id, distance)| SimilarDocument {
            metadata_id: MetadataId(metadata_id),
            distance,
        }))
    }

    async fn delete_metadata(&mut self, id: MetadataId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM metadata WHERE id = $1")
            .bind(id.0)
            .execute(self.connection()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_metadata(
        &mut self,
        title: &str,
        upload_date: NaiveDate,
    ) -> Result<Option<MetadataId>, StoreError> {
        let id: Option<i32> = sqlx::query_scalar(
            "INSERT INTO metadata (title, upload_date) VALUES ($1, $2) RETURNING id",
        )
        .bind(title)
        .bind(upload_date)
        .fetch_optional(self.connection()?)
        .await?;

        Ok(id.map(MetadataId))
    }

    async fn insert_content(
        &mut self,
        metadata_id: MetadataId,
        text: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO content (metadata_id, chunk_text, embedding) VALUES ($1, $2, $3)")
            .bind(metadata_id.0)
            .bind(text)
            .bind(Vector::from(embedding.to_vec()))
            .execute(self.connection()?)
            .await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(error) = tx.rollback().await {
                warn!(%error, "rollback on close failed");
            }
        }
        self.pool.close().await;
        info!("postgres connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_uses_configured_dimensions_and_cosine_index() {
        let statements = schema_statements(384);
        assert!(statements[0].contains("EXTENSION IF NOT EXISTS vector"));
        assert!(statements[2].contains("VECTOR(384)"));
        assert!(statements[2].contains("ON DELETE CASCADE"));
        assert!(statements[3].contains("vector_cosine_ops"));
        assert!(statements
            .iter()
            .all(|statement| statement.contains("IF NOT EXISTS")));
    }

    #[test]
    fn connect_options_carry_config() {
        let config = PgConfig {
            host: "db.internal".to_string(),
            port: 5433,
            user: "loader".to_string(),
            password: None,
            database: "circulars".to_string(),
        };
        let options = config.connect_options();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("circulars"));
    }

    /// Needs a reachable Postgres with pgvector: set `TEST_PG_HOST` and friends.
    #[tokio::test]
    #[ignore]
    async fn live_insert_is_found_as_its_own_nearest_neighbour() -> Result<(), StoreError> {
        let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
        let config = PgConfig {
            host: env("TEST_PG_HOST", "localhost"),
            port: env("TEST_PG_PORT", "5432").parse().unwrap_or(5432),
            user: env("TEST_PG_USER", "postgres"),
            password: std::env::var("TEST_PG_PASSWORD").ok(),
            database: env("TEST_PG_DB", "postgres"),
        };

        let mut probe = vec![0.0f32; 384];
        probe[0] = 1.0;

        let mut session = PgSession::connect(&config).await?;
        session.begin().await?;
        session.create_schema(384).await?;
        let id = session
            .insert_metadata("live-test.pdf", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .await?
            .expect("insert returns id");
        session.insert_content(id, "body", &probe).await?;
        let nearest = session.nearest_within(&probe, 0.05).await?;
        session.rollback().await?;
        session.close().await;

        assert_eq!(nearest.map(|found| found.metadata_id), Some(id));
        Ok(())
    }
}
