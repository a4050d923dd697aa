use serde::{Deserialize, Serialize};

use crate::model::ids::DocId;

/// A song in the corpus: metadata, raw lyrics, and the cleaned token
/// sequence produced by the preprocessor.
///
/// Documents are immutable once ingested; the fields are only readable
/// through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocId,
    title: String,
    artist: String,

    /// Link to the lyric page in the source dataset, if any.
    link: Option<String>,

    lyrics: String,
    tokens: Vec<String>,
}

impl Document {
    #[must_use]
    pub fn new(
        id: DocId,
        title: impl Into<String>,
        artist: impl Into<String>,
        lyrics: impl Into<String>,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            link: None,
            lyrics: lyrics.into(),
            tokens,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> &DocId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    #[must_use]
    pub fn lyrics(&self) -> &str {
        &self.lyrics
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_new() {
        let doc = Document::new(
            DocId::new("1"),
            "Dancing Queen",
            "ABBA",
            "You can dance",
            vec!["dance".to_string()],
        );
        assert_eq!(doc.title(), "Dancing Queen");
        assert_eq!(doc.artist(), "ABBA");
        assert_eq!(doc.tokens(), ["dance".to_string()]);
        assert!(doc.link().is_none());
    }

    #[test]
    fn test_document_with_link() {
        let doc = Document::new(DocId::new("1"), "t", "a", "l", Vec::new())
            .with_link("/a/abba/dancing+queen_20026131.html");
        assert_eq!(doc.link(), Some("/a/abba/dancing+queen_20026131.html"));
    }
}
