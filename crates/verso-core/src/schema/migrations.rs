/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Song documents (metadata, raw lyrics, cleaned tokens)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    link TEXT,
    lyrics TEXT NOT NULL,
    tokens TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_title ON documents(title COLLATE NOCASE);

-- Header of the persisted generation (at most one row)
CREATE TABLE IF NOT EXISTS artifact_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    artifact_version INTEGER NOT NULL,
    generation INTEGER NOT NULL,
    built_at TEXT NOT NULL,
    vocabulary_size INTEGER NOT NULL,
    document_count INTEGER NOT NULL,
    index_strategy TEXT NOT NULL,
    preprocessor TEXT NOT NULL
);

-- Frozen vocabulary with idf weights
CREATE TABLE IF NOT EXISTS vocabulary (
    dim INTEGER PRIMARY KEY,
    term TEXT NOT NULL UNIQUE,
    idf REAL NOT NULL
);

-- Sparse unit-length document vectors, entries as JSON [[dim, weight], ...]
CREATE TABLE IF NOT EXISTS document_vectors (
    doc_id TEXT PRIMARY KEY REFERENCES documents(id),
    entries TEXT NOT NULL
);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];
