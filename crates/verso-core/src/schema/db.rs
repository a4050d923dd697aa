use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::artifact::{ArtifactHeader, ArtifactSet, StoredVector, VocabEntry, ARTIFACT_VERSION};
use crate::error::{Error, Result};
use crate::model::{DocId, Document};

use super::migrations::MIGRATIONS;

/// A database connection holding the persisted engine artifacts.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }
}

// Artifact persistence
impl Database {
    /// Replace the stored artifacts with `set` in a single transaction.
    ///
    /// Readers never observe a mixture of two generations: either the old
    /// set or the new one is visible.
    pub fn save_artifacts(&mut self, set: &ArtifactSet) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM document_vectors", [])?;
        tx.execute("DELETE FROM vocabulary", [])?;
        tx.execute("DELETE FROM documents", [])?;
        tx.execute("DELETE FROM artifact_meta", [])?;

        let header = &set.header;
        tx.execute(
            "INSERT INTO artifact_meta (
                id, artifact_version, generation, built_at,
                vocabulary_size, document_count, index_strategy, preprocessor
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                header.artifact_version,
                to_i64(header.generation)?,
                header.built_at.to_rfc3339(),
                to_i64(header.vocabulary_size)?,
                to_i64(header.document_count)?,
                header.index_strategy,
                header.preprocessor,
            ],
        )?;

        {
            let mut insert_doc = tx.prepare(
                "INSERT INTO documents (id, title, artist, link, lyrics, tokens)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for doc in &set.documents {
                insert_doc.execute(rusqlite::params![
                    doc.id().as_str(),
                    doc.title(),
                    doc.artist(),
                    doc.link(),
                    doc.lyrics(),
                    serde_json::to_string(doc.tokens())?,
                ])?;
            }

            let mut insert_term =
                tx.prepare("INSERT INTO vocabulary (dim, term, idf) VALUES (?1, ?2, ?3)")?;
            for entry in &set.vocabulary {
                insert_term.execute(rusqlite::params![
                    entry.dim,
                    entry.term,
                    f64::from(entry.idf)
                ])?;
            }

            let mut insert_vector =
                tx.prepare("INSERT INTO document_vectors (doc_id, entries) VALUES (?1, ?2)")?;
            for vector in &set.vectors {
                insert_vector.execute(rusqlite::params![
                    vector.doc_id.as_str(),
                    serde_json::to_string(&vector.entries)?,
                ])?;
            }
        }

        tx.commit()?;

        log::info!(
            "Saved artifacts for generation {} ({} documents, {} terms)",
            header.generation,
            set.documents.len(),
            set.vocabulary.len()
        );
        Ok(())
    }

    /// Read the header of the stored generation, if any.
    pub fn artifact_header(&self) -> Result<Option<ArtifactHeader>> {
        let header = self
            .conn
            .query_row(
                "SELECT artifact_version, generation, built_at, vocabulary_size,
                        document_count, index_strategy, preprocessor
                 FROM artifact_meta WHERE id = 1",
                [],
                row_to_header,
            )
            .optional()?;
        Ok(header)
    }

    /// Load the complete stored artifact set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing has been saved yet and
    /// [`Error::IncompatibleArtifact`] when the stored set was written
    /// with a different [`ARTIFACT_VERSION`].
    pub fn load_artifacts(&self) -> Result<ArtifactSet> {
        let header = self.artifact_header()?.ok_or(Error::NotFound {
            entity: "artifact set",
            id: "current".to_string(),
        })?;

        if header.artifact_version != ARTIFACT_VERSION {
            return Err(Error::IncompatibleArtifact {
                found: header.artifact_version,
                expected: ARTIFACT_VERSION,
            });
        }

        let documents = self.list_documents()?;

        let mut stmt = self
            .conn
            .prepare("SELECT dim, term, idf FROM vocabulary ORDER BY dim")?;
        let vocabulary = stmt
            .query_map([], |row| {
                let idf: f64 = row.get(2)?;
                Ok(VocabEntry {
                    dim: row.get(0)?,
                    term: row.get(1)?,
                    idf: idf as f32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT doc_id, entries FROM document_vectors ORDER BY doc_id")?;
        let vectors = stmt
            .query_map([], |row| {
                let doc_id: String = row.get(0)?;
                let entries: String = row.get(1)?;
                Ok(StoredVector {
                    doc_id: DocId::new(doc_id),
                    entries: serde_json::from_str(&entries).map_err(|e| json_error(1, e))?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if header.vocabulary_size != vocabulary.len() || header.document_count != documents.len()
        {
            return Err(Error::InvalidData(format!(
                "artifact header counts ({} terms, {} documents) do not match stored rows ({} terms, {} documents)",
                header.vocabulary_size,
                header.document_count,
                vocabulary.len(),
                documents.len()
            )));
        }

        log::info!(
            "Loaded artifacts for generation {} ({} documents, {} terms)",
            header.generation,
            documents.len(),
            vocabulary.len()
        );

        Ok(ArtifactSet {
            header,
            documents,
            vocabulary,
            vectors,
        })
    }

    /// List all stored documents ordered by id.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, artist, link, lyrics, tokens
             FROM documents
             ORDER BY id",
        )?;

        let documents = stmt
            .query_map([], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(documents)
    }

    /// Count stored documents.
    pub fn count_documents(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn row_to_header(row: &rusqlite::Row) -> rusqlite::Result<ArtifactHeader> {
    let generation: i64 = row.get(1)?;
    let built_at_str: String = row.get(2)?;
    let vocabulary_size: i64 = row.get(3)?;
    let document_count: i64 = row.get(4)?;

    let built_at = DateTime::parse_from_rfc3339(&built_at_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ArtifactHeader {
        artifact_version: row.get(0)?,
        generation: u64::try_from(generation).unwrap_or(0),
        built_at: built_at.into(),
        vocabulary_size: usize::try_from(vocabulary_size).unwrap_or(0),
        document_count: usize::try_from(document_count).unwrap_or(0),
        index_strategy: row.get(5)?,
        preprocessor: row.get(6)?,
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let artist: String = row.get(2)?;
    let link: Option<String> = row.get(3)?;
    let lyrics: String = row.get(4)?;
    let tokens_json: String = row.get(5)?;
    let tokens: Vec<String> = serde_json::from_str(&tokens_json).map_err(|e| json_error(5, e))?;

    let doc = Document::new(DocId::new(id), title, artist, lyrics, tokens);
    Ok(match link {
        Some(link) => doc.with_link(link),
        None => doc,
    })
}

fn json_error(column: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn to_i64<T: TryInto<i64> + Copy + std::fmt::Display>(value: T) -> Result<i64> {
    value
        .try_into()
        .map_err(|_| Error::InvalidData(format!("value {value} does not fit in an SQLite integer")))
}
