//! Database schema SQL.

/// One row per stored pipeline result; the full result is kept as JSON.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS results (
    id TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    filename TEXT NOT NULL,
    document_type TEXT NOT NULL,
    success INTEGER NOT NULL,
    result_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_hash ON results(content_hash);
CREATE INDEX IF NOT EXISTS idx_results_created ON results(created_at);
"#;
