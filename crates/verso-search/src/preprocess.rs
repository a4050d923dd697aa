//! Lyric text normalization.
//!
//! Cleaning lower-cases the text, drops apostrophes so contractions stay
//! one word, replaces every other non-letter with a word break, removes
//! stop words and (optionally) strips common English suffixes. The same
//! settings must be used for the corpus and for free-text queries, so the
//! settings travel with the persisted artifacts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};

/// Tokens shorter than this are treated as noise.
const MIN_TOKEN_LEN: usize = 2;

/// A suffix is only stripped when at least this many letters remain.
const MIN_STEM_LEN: usize = 3;

/// Built-in English stop words, including apostrophe-less contractions
/// as they appear after cleaning ("don't" becomes "dont").
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "ain", "aint", "all", "am", "an", "and",
    "any", "are", "arent", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "cant", "could", "couldnt", "did", "didnt", "do",
    "does", "doesnt", "doing", "dont", "down", "during", "each", "few", "for", "from", "further",
    "gonna", "got", "gotta", "had", "hadnt", "has", "hasnt", "have", "havent", "having", "he",
    "hed", "hell", "her", "here", "hers", "herself", "hes", "him", "himself", "his", "how", "i",
    "id", "if", "ill", "im", "in", "into", "is", "isnt", "it", "its", "itself", "ive", "just",
    "let", "lets", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off",
    "oh", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "shed", "shell", "shes", "should", "shouldnt", "so", "some", "such", "than",
    "that", "thats", "the", "their", "theirs", "them", "themselves", "then", "there", "theres",
    "these", "they", "theyd", "theyll", "theyre", "theyve", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "wasnt", "we", "wed", "well", "were", "werent",
    "weve", "what", "whats", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "wont", "would", "wouldnt", "yeah", "you", "youd", "youll", "your", "youre", "yours",
    "yourself", "yourselves", "youve",
];

/// Preprocessing settings, persisted alongside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreprocessorSettings {
    pub stemming: bool,
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
}

/// Deterministic lyric cleaner.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    settings: PreprocessorSettings,
    stop_words: HashSet<String>,
}

impl Preprocessor {
    /// Create a preprocessor from explicit settings.
    #[must_use]
    pub fn new(settings: PreprocessorSettings) -> Self {
        let stop_words = STOP_WORDS
            .iter()
            .map(|w| (*w).to_string())
            .chain(settings.extra_stop_words.iter().map(|w| w.to_lowercase()))
            .collect();
        Self {
            settings,
            stop_words,
        }
    }

    /// Create a preprocessor from the search configuration.
    #[must_use]
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(PreprocessorSettings {
            stemming: config.stemming,
            extra_stop_words: config.extra_stop_words.clone(),
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &PreprocessorSettings {
        &self.settings
    }

    /// Clean `raw_text` into a token sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Data`] when no token survives cleaning.
    pub fn clean(&self, raw_text: &str) -> SearchResult<Vec<String>> {
        let tokens = self.tokenize(raw_text);
        if tokens.is_empty() {
            return Err(SearchError::Data(
                "text contains no usable tokens after cleaning".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// Clean `raw_text`, returning an empty sequence instead of an error
    /// when nothing survives.
    #[must_use]
    pub fn tokenize(&self, raw_text: &str) -> Vec<String> {
        let normalized: String = raw_text
            .chars()
            .filter(|c| !matches!(c, '\'' | '\u{2019}'))
            .flat_map(|c| {
                let letter = c.is_alphabetic();
                c.to_lowercase()
                    .map(move |lower| if letter { lower } else { ' ' })
            })
            .collect();

        normalized
            .split_whitespace()
            .filter(|word| char_len(word) >= MIN_TOKEN_LEN && !self.stop_words.contains(*word))
            .map(|word| {
                if self.settings.stemming {
                    stem(word)
                } else {
                    word.to_string()
                }
            })
            .filter(|token| char_len(token) >= MIN_TOKEN_LEN && !self.stop_words.contains(token))
            .collect()
    }

    /// Normalize a single word the way [`tokenize`](Self::tokenize) would,
    /// or `None` when it would be dropped.
    #[must_use]
    pub fn normalize_word(&self, word: &str) -> Option<String> {
        self.tokenize(word).into_iter().next()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

fn char_len(word: &str) -> usize {
    word.chars().count()
}

/// Strip one common English suffix from a lower-case word.
///
/// This is a light stemmer: it only needs to map inflections of the same
/// word onto one key deterministically, not to produce dictionary roots.
#[must_use]
pub fn stem(word: &str) -> String {
    const RULES: &[(&str, &str)] = &[
        ("fulness", ""),
        ("ness", ""),
        ("ful", ""),
        ("ingly", ""),
        ("ing", ""),
        ("edly", ""),
        ("ied", "y"),
        ("ies", "y"),
        ("ed", ""),
        ("ly", ""),
        ("sses", "ss"),
    ];

    for (suffix, replacement) in RULES {
        if let Some(root) = word.strip_suffix(suffix) {
            if char_len(root) >= MIN_STEM_LEN {
                return format!("{root}{replacement}");
            }
        }
    }

    if word.ends_with('s') && !(word.ends_with("ss") || word.ends_with("us") || word.ends_with("is"))
    {
        let root = &word[..word.len() - 1];
        if char_len(root) >= MIN_STEM_LEN {
            return root.to_string();
        }
    }

    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Preprocessor {
        Preprocessor::new(PreprocessorSettings {
            stemming: false,
            extra_stop_words: Vec::new(),
        })
    }

    #[test]
    fn test_clean_lowercases_and_strips_punctuation() {
        let tokens = plain().clean("Love, LOVE!! heart... (soul)").unwrap();
        assert_eq!(tokens, vec!["love", "love", "heart", "soul"]);
    }

    #[test]
    fn test_clean_keeps_accented_words_whole() {
        let tokens = plain().clean("Café SEÑORITA naïve, über-cool").unwrap();
        assert_eq!(tokens, vec!["café", "señorita", "naïve", "über", "cool"]);
    }

    #[test]
    fn test_stemming_accented_word() {
        assert_eq!(stem("señoritas"), "señorita");
        assert_eq!(stem("años"), "año");
    }

    #[test]
    fn test_clean_removes_stop_words_and_contractions() {
        let tokens = plain().clean("I don't want the night to end").unwrap();
        assert_eq!(tokens, vec!["want", "night", "end"]);
    }

    #[test]
    fn test_clean_drops_digits_and_single_letters() {
        let tokens = plain().clean("24 7 x dancing").unwrap();
        assert_eq!(tokens, vec!["dancing"]);
    }

    #[test]
    fn test_clean_empty_text_is_data_error() {
        assert!(matches!(plain().clean(""), Err(SearchError::Data(_))));
        assert!(matches!(
            plain().clean("the and of ?!"),
            Err(SearchError::Data(_))
        ));
    }

    #[test]
    fn test_clean_is_deterministic() {
        let pre = Preprocessor::default();
        let text = "Walking on broken glass, feelings of emptiness and soulful cries";
        assert_eq!(pre.clean(text).unwrap(), pre.clean(text).unwrap());
    }

    #[test]
    fn test_extra_stop_words() {
        let pre = Preprocessor::new(PreprocessorSettings {
            stemming: false,
            extra_stop_words: vec!["Chorus".to_string()],
        });
        assert_eq!(pre.clean("chorus baby").unwrap(), vec!["baby"]);
    }

    #[test]
    fn test_stemming_maps_inflections_together() {
        assert_eq!(stem("soulful"), "soul");
        assert_eq!(stem("dancing"), "danc");
        assert_eq!(stem("hearts"), "heart");
        assert_eq!(stem("memories"), "memory");
        assert_eq!(stem("kindness"), "kind");
    }

    #[test]
    fn test_stemming_keeps_short_roots() {
        assert_eq!(stem("sing"), "sing");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("kiss"), "kiss");
        assert_eq!(stem("love"), "love");
    }

    #[test]
    fn test_normalize_word() {
        let pre = Preprocessor::default();
        assert_eq!(pre.normalize_word("Soulful"), Some("soul".to_string()));
        assert_eq!(pre.normalize_word("the"), None);
    }
}
