//! Song lyric dataset ingest.
//!
//! The dataset is a CSV file with `artist`, `song`, `link` and `text`
//! columns and an optional `id` column. Rows without an id get their
//! 1-based row ordinal, zero-padded, so ids sort in file order.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use verso_core::model::{DocId, Document};

use crate::error::{SearchError, SearchResult};
use crate::preprocess::Preprocessor;

/// One dataset row as read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawSong {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Result of cleaning a batch of raw songs.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,

    /// Songs dropped because no token survived cleaning.
    pub skipped: Vec<DocId>,
}

/// Read the dataset at `path`.
///
/// # Errors
///
/// Returns [`SearchError::Corpus`] when the file cannot be opened or a row
/// cannot be parsed.
pub fn load_csv(path: impl AsRef<Path>) -> SearchResult<Vec<RawSong>> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| SearchError::Corpus {
            path: label.clone(),
            message: format!("failed to open CSV: {e}"),
        })?;
    let songs = read_songs(reader, &label)?;
    log::info!("Read {} songs from {}", songs.len(), label);
    Ok(songs)
}

/// Read the dataset from any reader; `label` names the source in errors.
///
/// # Errors
///
/// Returns [`SearchError::Corpus`] when a row cannot be parsed.
pub fn load_reader<R: Read>(source: R, label: &str) -> SearchResult<Vec<RawSong>> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(source);
    read_songs(reader, label)
}

fn read_songs<R: Read>(mut reader: csv::Reader<R>, label: &str) -> SearchResult<Vec<RawSong>> {
    let mut songs = Vec::new();
    for (row, record) in reader.deserialize::<RawSong>().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let mut song = record.map_err(|e| SearchError::Corpus {
            path: label.to_string(),
            message: format!("line {line}: {e}"),
        })?;

        if song.song.trim().is_empty() || song.text.trim().is_empty() {
            log::warn!("{label} line {line}: missing title or lyrics, skipping");
            continue;
        }
        if song.id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            song.id = Some(DocId::from_ordinal(row + 1).to_string());
        }
        songs.push(song);
    }
    Ok(songs)
}

/// Clean every song into a [`Document`].
///
/// Songs whose lyrics leave no token after cleaning are reported in
/// [`IngestReport::skipped`] instead of failing the batch.
#[must_use]
pub fn ingest(raw: Vec<RawSong>, preprocessor: &Preprocessor) -> IngestReport {
    let mut report = IngestReport::default();
    for (ordinal, song) in raw.into_iter().enumerate() {
        let id = song
            .id
            .map(DocId::new)
            .unwrap_or_else(|| DocId::from_ordinal(ordinal + 1));

        match preprocessor.clean(&song.text) {
            Ok(tokens) => {
                let mut doc = Document::new(
                    id,
                    song.song.trim(),
                    song.artist.trim(),
                    song.text,
                    tokens,
                );
                if let Some(link) = song.link.filter(|l| !l.trim().is_empty()) {
                    doc = doc.with_link(link);
                }
                report.documents.push(doc);
            }
            Err(e) => {
                log::warn!("Dropping song {} ('{}'): {}", id, song.song, e);
                report.skipped.push(id);
            }
        }
    }
    log::info!(
        "Ingested {} documents, dropped {}",
        report.documents.len(),
        report.skipped.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
artist,song,link,text
ABBA,Dancing Queen,/a/abba/dancing+queen_20598417.html,\"You can dance, you can jive\"
Adele,Hello,,\"Hello from the other side\"
Nobody,,,\"no title here\"
Bad,Only Stop Words,,\"the and of it\"
";

    #[test]
    fn test_load_reader_assigns_ordinal_ids() {
        let songs = load_reader(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(songs.len(), 3);
        assert_eq!(songs[0].id.as_deref(), Some("0000001"));
        assert_eq!(songs[1].id.as_deref(), Some("0000002"));
        // The untitled row is skipped but still consumes an ordinal.
        assert_eq!(songs[2].id.as_deref(), Some("0000004"));
    }

    #[test]
    fn test_explicit_id_column_is_kept() {
        let data = "id,artist,song,link,text\nx-1,A,Song,,words here\n";
        let songs = load_reader(data.as_bytes(), "ids").unwrap();
        assert_eq!(songs[0].id.as_deref(), Some("x-1"));
    }

    #[test]
    fn test_ingest_drops_songs_without_tokens() {
        let songs = load_reader(SAMPLE.as_bytes(), "sample").unwrap();
        let report = ingest(songs, &Preprocessor::default());
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.skipped, vec![DocId::new("0000004")]);

        let queen = &report.documents[0];
        assert_eq!(queen.title(), "Dancing Queen");
        assert_eq!(queen.link(), Some("/a/abba/dancing+queen_20598417.html"));
        assert!(queen.tokens().contains(&"jive".to_string()));
        assert_eq!(report.documents[1].link(), None);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv("/nonexistent/songdata.csv").unwrap_err();
        assert!(matches!(err, SearchError::Corpus { .. }));
    }

    #[test]
    fn test_load_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("songs.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_csv(&path).unwrap().len(), 3);
    }
}
