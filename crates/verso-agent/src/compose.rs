//! Reply text.
//!
//! Everything the controller says without the generation port comes from
//! here, so every reply is grounded in the tool result it describes.

use std::collections::HashMap;

use verso_search::{Recommendation, RecommendationResult};

use crate::intent::{ClarifyReason, Descriptor, ReplyKind};

/// System prompt for rephrasing a recommendation reply.
pub const FORMAT_PROMPT: &str = "You are a helpful music assistant. Format the following \
recommendations in a friendly way. Only mention the songs listed and keep each reason.";

/// System prompt for conversation that needs no recommendation.
///
/// The model never names songs here; only a search result may.
pub const CHAT_PROMPT: &str = "You are a helpful music assistant for a lyrics-similarity \
search. Reply briefly to the user. Never name, suggest or invent any song, artist or album \
yourself. If the user wants music, ask them to describe a mood or give the title of a song \
they like so the search can find matches.";

/// What the recommendations were anchored on.
#[derive(Debug, Clone)]
pub enum Anchor {
    Descriptors(Vec<Descriptor>),
    Song { title: String, artist: String },
}

/// Maps shared vocabulary terms back to the descriptor that asked for
/// them.
#[derive(Debug, Clone)]
pub struct Explainer {
    anchor: Anchor,
    terms: HashMap<String, String>,
}

impl Explainer {
    /// `terms` maps a normalized vocabulary term to the descriptor word it
    /// came from.
    pub fn new(anchor: Anchor, terms: HashMap<String, String>) -> Self {
        Self { anchor, terms }
    }

    pub fn for_song(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(
            Anchor::Song {
                title: title.into(),
                artist: artist.into(),
            },
            HashMap::new(),
        )
    }

    /// One-line reason for `rec`.
    pub fn reason(&self, rec: &Recommendation) -> String {
        let shared = rec
            .rationale
            .as_ref()
            .map(|r| r.shared_terms.as_slice())
            .unwrap_or_default();

        match &self.anchor {
            Anchor::Descriptors(descriptors) => {
                let mut matched: Vec<&str> = Vec::new();
                for term in shared {
                    if let Some(word) = self.terms.get(term) {
                        if !matched.contains(&word.as_str()) {
                            matched.push(word);
                        }
                    }
                }
                if matched.is_empty() {
                    format!(
                        "closest lyrical match for {} (similarity {:.2})",
                        quoted_list(descriptors.iter().map(|d| d.word.as_str())),
                        rec.score
                    )
                } else {
                    format!(
                        "fits {}; the lyrics share {}",
                        quoted_list(matched.iter().copied()),
                        shared.join(", ")
                    )
                }
            }
            Anchor::Song { title, .. } => {
                if shared.is_empty() {
                    format!("similar to {} (similarity {:.2})", title, rec.score)
                } else {
                    format!(
                        "shares {} with {} (similarity {:.2})",
                        shared.join(", "),
                        title,
                        rec.score
                    )
                }
            }
        }
    }

    /// The full templated reply for a successful tool call.
    pub fn compose(&self, result: &RecommendationResult) -> String {
        if result.is_empty() {
            return match &self.anchor {
                Anchor::Descriptors(descriptors) => format!(
                    "I couldn't find any songs whose lyrics match {}. Try describing the mood \
                     with different words, or name a song you like.",
                    quoted_list(descriptors.iter().map(|d| d.word.as_str()))
                ),
                Anchor::Song { title, artist } => format!(
                    "I couldn't find songs with lyrics close to {title} by {artist}."
                ),
            };
        }

        let intro = match &self.anchor {
            Anchor::Descriptors(descriptors) => format!(
                "Here are songs for {}:",
                quoted_list(descriptors.iter().map(|d| d.word.as_str()))
            ),
            Anchor::Song { title, artist } => {
                format!("Here are songs with lyrics like {title} by {artist}:")
            }
        };

        std::iter::once(intro)
            .chain(result.results.iter().enumerate().map(|(n, rec)| {
                format!("{}. {} by {} ({})", n + 1, rec.title, rec.artist, self.reason(rec))
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Follow-up question for a turn that cannot be answered yet.
pub fn clarify(reason: &ClarifyReason) -> String {
    match reason {
        ClarifyReason::Empty => {
            "What are you in the mood for? Describe a feeling or name a song.".to_string()
        }
        ClarifyReason::NoDescriptors => "Happy to find you something! What kind of mood, \
            genre or theme are you after? Or name a song you like and I'll find similar \
            lyrics."
            .to_string(),
        ClarifyReason::UnknownTitle(title) => format!(
            "I couldn't find \"{title}\" in my catalogue. Could you try another song, or \
             describe the mood you want instead?"
        ),
    }
}

/// Canned reply for conversation that needs no tool call.
pub fn direct_reply(kind: ReplyKind) -> String {
    match kind {
        ReplyKind::Greeting => "Hi! Tell me a mood (\"something upbeat but soulful\") or a \
            song you like, and I'll recommend songs with similar lyrics."
            .to_string(),
        ReplyKind::Thanks => "You're welcome! Ask any time you want more music.".to_string(),
        ReplyKind::Help => "I recommend songs by lyrical similarity. Describe a mood, genre \
            or theme, or name a song in quotes, and add a count like \"5 songs\" if you \
            want more or fewer."
            .to_string(),
        ReplyKind::Farewell => "Goodbye, enjoy the music!".to_string(),
        ReplyKind::SmallTalk => "I'm best at finding songs. Tell me a mood or a song you \
            like and I'll look for lyrics that match."
            .to_string(),
    }
}

/// Reply for a failed tool call. Never lists songs.
pub fn tool_failure(unavailable: bool) -> String {
    if unavailable {
        "Sorry, my song catalogue isn't available right now, so I can't recommend \
         anything yet. Please try again later."
            .to_string()
    } else {
        "Sorry, I couldn't run that search. Could you rephrase your request?".to_string()
    }
}

/// User message sent with [`FORMAT_PROMPT`].
pub fn format_request(user_input: &str, templated: &str) -> String {
    format!("The user asked: {user_input}\n\nRecommendations:\n{templated}")
}

fn quoted_list<'a>(words: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = words.map(|w| format!("\"{w}\"")).collect();
    match quoted.len() {
        0 => "your request".to_string(),
        1 => quoted[0].clone(),
        n => format!("{} and {}", quoted[..n - 1].join(", "), quoted[n - 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_core::model::DocId;
    use verso_search::Rationale;

    fn descriptor(word: &str) -> Descriptor {
        Descriptor {
            word: word.to_string(),
            term: word.to_string(),
            group: "mood".to_string(),
            related: Vec::new(),
        }
    }

    fn rec(title: &str, score: f32, shared: &[&str]) -> Recommendation {
        Recommendation {
            doc_id: DocId::new(title),
            title: title.to_string(),
            artist: "Artist".to_string(),
            score,
            rationale: (!shared.is_empty()).then(|| Rationale {
                shared_terms: shared.iter().map(|s| (*s).to_string()).collect(),
            }),
        }
    }

    fn explainer() -> Explainer {
        let terms = HashMap::from([
            ("soul".to_string(), "soulful".to_string()),
            ("danc".to_string(), "upbeat".to_string()),
        ]);
        Explainer::new(
            Anchor::Descriptors(vec![descriptor("upbeat"), descriptor("soulful")]),
            terms,
        )
    }

    #[test]
    fn test_reason_maps_shared_terms_to_descriptors() {
        let reason = explainer().reason(&rec("A", 0.5, &["soul", "danc", "night"]));
        assert_eq!(
            reason,
            "fits \"soulful\" and \"upbeat\"; the lyrics share soul, danc, night"
        );
    }

    #[test]
    fn test_reason_falls_back_to_score() {
        let reason = explainer().reason(&rec("A", 0.4321, &["night"]));
        assert_eq!(
            reason,
            "closest lyrical match for \"upbeat\" and \"soulful\" (similarity 0.43)"
        );
    }

    #[test]
    fn test_compose_numbers_results() {
        let result = RecommendationResult {
            results: vec![rec("First", 0.9, &["soul"]), rec("Second", 0.2, &[])],
        };
        let text = explainer().compose(&result);
        assert!(text.starts_with("Here are songs for \"upbeat\" and \"soulful\":"));
        assert!(text.contains("\n1. First by Artist (fits \"soulful\""));
        assert!(text.contains("\n2. Second by Artist (closest lyrical match"));
    }

    #[test]
    fn test_compose_empty_result_lists_nothing() {
        let text = explainer().compose(&RecommendationResult::default());
        assert!(text.starts_with("I couldn't find any songs"));
    }

    #[test]
    fn test_song_anchor_reason() {
        let explainer = Explainer::for_song("Dancing Queen", "ABBA");
        let reason = explainer.reason(&rec("B", 0.25, &["danc", "night"]));
        assert_eq!(reason, "shares danc, night with Dancing Queen (similarity 0.25)");
    }

    #[test]
    fn test_chat_prompt_forbids_own_suggestions() {
        assert!(CHAT_PROMPT.contains("Never name, suggest or invent any song"));
        assert!(!CHAT_PROMPT.contains("You can recommend"));
    }

    #[test]
    fn test_quoted_list() {
        assert_eq!(quoted_list(["a"].into_iter()), "\"a\"");
        assert_eq!(quoted_list(["a", "b", "c"].into_iter()), "\"a\", \"b\" and \"c\"");
        assert_eq!(quoted_list(std::iter::empty()), "your request");
    }
}
