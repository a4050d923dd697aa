//! Intent classification.
//!
//! A deterministic classifier turns one user message into a closed
//! [`Action`]: call the recommendation tool, ask a clarifying question, or
//! reply directly. Descriptor terms come from a [`DescriptorLexicon`]
//! loaded from TOML; the built-in lexicon covers common moods, tempos,
//! genres and themes.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

/// Upper bound on a requested recommendation count.
pub const MAX_K: usize = 20;

const BUILTIN_LEXICON: &str = include_str!("lexicon.toml");

const REQUEST_CUES: &[&str] = &[
    "recommend", "recommendation", "recommendations", "suggest", "suggestion", "suggestions",
    "similar", "like", "song", "songs", "track", "tracks", "tune", "tunes", "music", "playlist",
    "play", "listen", "something", "anything",
];

const NEGATIONS: &[&str] = &["not", "no", "without", "never", "nothing", "dont", "isnt"];

const NUMBER_WORDS: &[(&str, usize)] = &[
    ("one", 1), ("two", 2), ("three", 3), ("four", 4), ("five", 5), ("six", 6), ("seven", 7),
    ("eight", 8), ("nine", 9), ("ten", 10), ("eleven", 11), ("twelve", 12), ("fifteen", 15),
    ("twenty", 20), ("a couple of", 2), ("a couple", 2), ("a few", 3),
];

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

/// Descriptor groups keyed by kind (mood, tempo, genre, theme).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorLexicon {
    #[serde(default)]
    pub groups: Vec<DescriptorGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorGroup {
    pub name: String,
    #[serde(default)]
    pub descriptors: Vec<DescriptorEntry>,
}

/// One descriptor with the words that name it and the lyric words that
/// express it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorEntry {
    pub term: String,

    /// Other ways a listener might say `term`.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Lyric vocabulary added to the similarity query.
    #[serde(default)]
    pub related: Vec<String>,
}

impl DescriptorLexicon {
    /// The compiled-in lexicon.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Lexicon`] if the built-in table is malformed.
    pub fn builtin() -> AgentResult<Self> {
        Self::parse(BUILTIN_LEXICON)
    }

    /// Load a lexicon from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Lexicon`] when the file cannot be read or
    /// parsed, or defines no descriptors.
    pub fn load(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Lexicon(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| AgentError::Lexicon(format!("{}: {}", path.display(), e)))
    }

    /// Load `path` when given, otherwise the built-in lexicon.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_or_builtin(path: Option<&Path>) -> AgentResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    fn parse(content: &str) -> AgentResult<Self> {
        let lexicon: Self =
            toml::from_str(content).map_err(|e| AgentError::Lexicon(e.to_string()))?;
        if lexicon.is_empty() {
            return Err(AgentError::Lexicon("lexicon defines no descriptors".to_string()));
        }
        Ok(lexicon)
    }

    /// Total number of descriptors across groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.descriptors.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A descriptor found in a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// The words as the user wrote them (normalized).
    pub word: String,

    /// Lexicon term the words map to.
    pub term: String,

    pub group: String,
    pub related: Vec<String>,
}

/// What the recommendation tool is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRequest {
    /// Free-text query built from mood/genre descriptors.
    Descriptors {
        descriptors: Vec<Descriptor>,
        k: Option<usize>,
    },
    /// Neighbours of a named song.
    SimilarTo { title: String, k: Option<usize> },
}

impl ToolRequest {
    pub const fn k(&self) -> Option<usize> {
        match self {
            Self::Descriptors { k, .. } | Self::SimilarTo { k, .. } => *k,
        }
    }
}

/// Why the controller asks a follow-up question instead of calling the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyReason {
    /// The message was blank.
    Empty,
    /// A request without any recognisable descriptor or song.
    NoDescriptors,
    /// A named song is not in the catalogue.
    UnknownTitle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Greeting,
    Thanks,
    Help,
    Farewell,
    SmallTalk,
}

/// The closed set of things the controller can do with a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ToolCall(ToolRequest),
    Clarify(ClarifyReason),
    DirectReply(ReplyKind),
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Form {
    /// Normalized words, space separated.
    text: String,
    entry: usize,
}

/// Keyword classifier over a descriptor lexicon.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    entries: Vec<(String, DescriptorEntry)>,
    forms: Vec<Form>,
    double_quoted: Regex,
    single_quoted: Regex,
    similar_to: Regex,
    count: Regex,
}

impl IntentClassifier {
    /// Build a classifier over `lexicon`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Lexicon`] if a pattern fails to compile.
    pub fn new(lexicon: &DescriptorLexicon) -> AgentResult<Self> {
        let mut entries = Vec::with_capacity(lexicon.len());
        let mut forms = Vec::new();
        for group in &lexicon.groups {
            for entry in &group.descriptors {
                let index = entries.len();
                for form in std::iter::once(&entry.term).chain(&entry.aliases) {
                    let text = normalize(form);
                    if !text.is_empty() {
                        forms.push(Form { text, entry: index });
                    }
                }
                entries.push((group.name.clone(), entry.clone()));
            }
        }
        // Longest form first so "rock and roll" wins over "rock".
        forms.sort_by(|a, b| b.text.len().cmp(&a.text.len()).then(a.text.cmp(&b.text)));

        let numbers = NUMBER_WORDS
            .iter()
            .map(|(word, _)| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            entries,
            forms,
            double_quoted: compile(r#"["\u{201C}\u{201D}]([^"\u{201C}\u{201D}]+)["\u{201C}\u{201D}]"#)?,
            single_quoted: compile(r"(?:^|[\s(])['\u{2018}]([^'\u{2018}\u{2019}]+)['\u{2019}](?:$|[\s).,!?;:])")?,
            similar_to: compile(r"(?i)\bsimilar to\s+(?:the song\s+)?(.+?)\s*(?:[?.!]|$)")?,
            count: compile(&format!(
                r"(?i)\b(\d{{1,3}}|{numbers})\s+(?:[a-z]+\s+)?(?:more\s+)?(?:songs?|tracks?|tunes?|recommendations?|suggestions?|picks?)\b"
            ))?,
        })
    }

    /// Classify one user message.
    pub fn classify(&self, message: &str) -> Action {
        let message = message.trim();
        if message.is_empty() {
            return Action::Clarify(ClarifyReason::Empty);
        }

        let k = self.requested_count(message);

        if let Some(title) = self.quoted_title(message) {
            return Action::ToolCall(ToolRequest::SimilarTo { title, k });
        }

        let descriptors = self.descriptors(message);

        // "similar to X" names a song unless X is itself made of descriptors.
        if let Some(caps) = self.similar_to.captures(message) {
            let target = caps.get(1).map_or("", |m| m.as_str()).trim();
            if !target.is_empty() && self.descriptors(target).is_empty() {
                return Action::ToolCall(ToolRequest::SimilarTo {
                    title: target.to_string(),
                    k,
                });
            }
        }

        if !descriptors.is_empty() {
            return Action::ToolCall(ToolRequest::Descriptors { descriptors, k });
        }

        let normalized = normalize(message);
        let words: HashSet<&str> = normalized.split(' ').collect();
        if REQUEST_CUES.iter().any(|cue| words.contains(cue)) || k.is_some() {
            return Action::Clarify(ClarifyReason::NoDescriptors);
        }

        Action::DirectReply(reply_kind(&normalized, &words))
    }

    /// Descriptors in order of first appearance, each at most once.
    /// A descriptor directly preceded by a negation ("not sad") is ignored.
    pub fn descriptors(&self, text: &str) -> Vec<Descriptor> {
        let normalized = normalize(text);
        let padded = format!(" {normalized} ");
        let mut claimed = vec![false; padded.len()];
        let mut found: Vec<(usize, usize, String)> = Vec::new();

        for form in &self.forms {
            let needle = format!(" {} ", form.text);
            let mut start = 0;
            while let Some(offset) = padded[start..].find(&needle) {
                let at = start + offset;
                let span = at + 1..at + needle.len() - 1;
                start = at + 1;
                if claimed[span.clone()].iter().any(|&c| c) || negated(&padded[..at]) {
                    continue;
                }
                claimed[span].iter_mut().for_each(|c| *c = true);
                if !found.iter().any(|(_, entry, _)| *entry == form.entry) {
                    found.push((at, form.entry, form.text.clone()));
                }
            }
        }

        found.sort_by_key(|(at, _, _)| *at);
        found
            .into_iter()
            .map(|(_, entry, word)| {
                let (group, entry) = &self.entries[entry];
                Descriptor {
                    word,
                    term: entry.term.clone(),
                    group: group.clone(),
                    related: entry.related.clone(),
                }
            })
            .collect()
    }

    /// An explicit recommendation count, capped at [`MAX_K`].
    pub fn requested_count(&self, message: &str) -> Option<usize> {
        let caps = self.count.captures(message)?;
        let raw = caps.get(1)?.as_str().to_lowercase();
        let n = raw.parse::<usize>().ok().or_else(|| {
            NUMBER_WORDS
                .iter()
                .find(|(word, _)| *word == raw)
                .map(|(_, n)| *n)
        })?;
        (n > 0).then(|| n.min(MAX_K))
    }

    fn quoted_title(&self, message: &str) -> Option<String> {
        self.double_quoted
            .captures(message)
            .or_else(|| self.single_quoted.captures(message))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|title| !title.is_empty())
    }
}

fn compile(pattern: &str) -> AgentResult<Regex> {
    Regex::new(pattern).map_err(|e| AgentError::Lexicon(format!("bad pattern: {e}")))
}

/// Lower-case, drop apostrophes, and reduce everything else that is not a
/// letter to single spaces.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| {
            if c.is_alphabetic() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the word just before a match is a negation.
fn negated(before: &str) -> bool {
    before
        .split_whitespace()
        .next_back()
        .is_some_and(|word| NEGATIONS.contains(&word))
}

fn reply_kind(normalized: &str, words: &HashSet<&str>) -> ReplyKind {
    let any = |list: &[&str]| list.iter().any(|w| words.contains(w));
    if any(&["thanks", "thank", "thx", "cheers", "ty"]) {
        ReplyKind::Thanks
    } else if any(&["bye", "goodbye", "farewell", "later"]) {
        ReplyKind::Farewell
    } else if any(&["help"]) || normalized.contains("what can you do") || normalized.contains("how does this work") {
        ReplyKind::Help
    } else if any(&["hi", "hello", "hey", "howdy", "greetings", "yo"]) || normalized.starts_with("good morning") || normalized.starts_with("good evening") {
        ReplyKind::Greeting
    } else {
        ReplyKind::SmallTalk
    }
}
