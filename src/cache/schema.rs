//! Cache schema initialization

use sqlx::SqlitePool;

use super::types::Result;

/// Initialize the cache schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Recently opened documents, one row per display name
CREATE TABLE IF NOT EXISTS documents (
    name TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    is_reference INTEGER NOT NULL,
    last_access INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_last_access ON documents(last_access);
"#;
