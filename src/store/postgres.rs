use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::{Document, Store, StoreError};

const CREATE_RECORDS: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        seq BIGSERIAL,
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        version BIGINT NOT NULL,
        lookup_key TEXT,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (kind, id)
    )
"#;

const CREATE_LOOKUP_INDEX: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS records_lookup_key
        ON records (kind, lookup_key)
        WHERE lookup_key IS NOT NULL
"#;

#[derive(Debug, FromRow)]
struct DocumentRow {
    kind: String,
    id: String,
    version: i64,
    lookup_key: Option<String>,
    body: Json<serde_json::Value>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            kind: row.kind,
            id: row.id,
            version: row.version,
            lookup_key: row.lookup_key,
            body: row.body.0,
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

const LOOKUP_CONSTRAINT: &str = "records_lookup_key";

// Unique violations name the constraint they hit: the primary key means the
// id is taken, the partial index means the lookup key is.
fn unique_violation(e: &sqlx::Error, doc: &Document) -> Option<StoreError> {
    let sqlx::Error::Database(db) = e else {
        return None;
    };
    if db.code().as_deref() != Some("23505") {
        return None;
    }
    match (&doc.lookup_key, db.constraint()) {
        (Some(key), Some(LOOKUP_CONSTRAINT)) => Some(StoreError::Duplicate {
            kind: doc.kind.clone(),
            key: key.clone(),
        }),
        _ => Some(StoreError::IdTaken {
            kind: doc.kind.clone(),
            id: doc.id.clone(),
        }),
    }
}

/// Postgres backed store. All records share one JSONB table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_RECORDS)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query(CREATE_LOOKUP_INDEX)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        info!("records table ready");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, doc: Document) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO records (kind, id, version, lookup_key, body) VALUES ($1, $2, 1, $3, $4)",
        )
        .bind(&doc.kind)
        .bind(&doc.id)
        .bind(&doc.lookup_key)
        .bind(Json(doc.body.clone()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(unique_violation(&e, &doc).unwrap_or_else(|| backend(e))),
        }
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT kind, id, version, lookup_key, body FROM records WHERE kind = $1 AND id = $2",
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(Document::from))
    }

    async fn find_by_key(&self, kind: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT kind, id, version, lookup_key, body FROM records WHERE kind = $1 AND lookup_key = $2",
        )
        .bind(kind)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(Document::from))
    }

    async fn update(&self, doc: Document, expected_version: i64) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "UPDATE records SET version = version + 1, lookup_key = $3, body = $4, updated_at = now()
             WHERE kind = $1 AND id = $2 AND version = $5",
        )
        .bind(&doc.kind)
        .bind(&doc.id)
        .bind(&doc.lookup_key)
        .bind(Json(doc.body.clone()))
        .bind(expected_version)
        .execute(&self.pool)
        .await;

        let rows = match result {
            Ok(done) => done.rows_affected(),
            Err(e) => return Err(unique_violation(&e, &doc).unwrap_or_else(|| backend(e))),
        };

        if rows > 0 {
            return Ok(expected_version + 1);
        }

        // Zero rows: either the record is gone or its version moved on.
        match self.get(&doc.kind, &doc.id).await? {
            Some(_) => Err(StoreError::Conflict {
                kind: doc.kind,
                id: doc.id,
                expected_version,
            }),
            None => Err(StoreError::Missing {
                kind: doc.kind,
                id: doc.id,
            }),
        }
    }

    async fn list(&self, kind: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT kind, id, version, lookup_key, body FROM records WHERE kind = $1 ORDER BY seq ASC",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}
