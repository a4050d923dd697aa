//! Conversational controller.
//!
//! Each turn walks a small state machine:
//!
//! ```text
//! Idle -> Interpreting -> ToolCalling  -> Responding -> Idle
//!                      -> Clarifying   -> Responding
//!                      -> DirectReply  -> Responding
//! ToolCalling -> Clarifying            (named song not in the catalogue)
//! ```
//!
//! The [`Controller`] is shared and stateless; every [`Session`] owns its
//! [`ConversationState`] and handles one turn at a time through `&mut self`.
//! A turn that is cancelled or times out mid-way is rolled back to `Idle`
//! by a drop guard, so no session is ever left in `ToolCalling`.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use verso_core::model::SessionId;
use verso_search::service::SongSummary;
use verso_search::{QueryRequest, QueryService, Recommendation, RecommendationResult};

use crate::compose::{self, Anchor, Explainer};
use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::intent::{Action, ClarifyReason, Descriptor, DescriptorLexicon, IntentClassifier, ToolRequest};
use crate::llm::{strip_thinking, ChatMessage, GenerationPort, GenerationRequest, GroqClient};

const DEFAULT_HISTORY_TURNS: usize = 10;
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a session is within its current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Interpreting,
    ToolCalling,
    Clarifying,
    DirectReply,
    Responding,
}

impl ControllerState {
    /// Whether the state machine has an edge from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ControllerState::{Clarifying, DirectReply, Idle, Interpreting, Responding, ToolCalling};
        matches!(
            (self, next),
            (Idle, Interpreting)
                | (Interpreting, ToolCalling | Clarifying | DirectReply)
                | (ToolCalling, Responding | Clarifying)
                | (Clarifying | DirectReply, Responding)
                | (Responding, Idle)
        )
    }
}

/// One completed exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub user: String,
    pub reply: String,
    pub action: Action,
}

/// The most recent tool call of a session and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub request: QueryRequest,
    pub outcome: Result<RecommendationResult, String>,
}

/// Per-session conversation memory.
#[derive(Debug, Clone)]
pub struct ConversationState {
    session_id: SessionId,
    state: ControllerState,
    history: VecDeque<Turn>,
    capacity: usize,
    last_tool_call: Option<ToolCallRecord>,
}

impl ConversationState {
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        Self {
            session_id,
            state: ControllerState::Idle,
            history: VecDeque::with_capacity(capacity),
            capacity,
            last_tool_call: None,
        }
    }

    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// Past turns, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn turns(&self) -> usize {
        self.history.len()
    }

    pub const fn last_tool_call(&self) -> Option<&ToolCallRecord> {
        self.last_tool_call.as_ref()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] for an edge the state
    /// machine does not have; the state is left unchanged.
    pub fn transition(&mut self, next: ControllerState) -> AgentResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        log::debug!("session {}: {:?} -> {:?}", self.session_id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Drop back to `Idle` from anywhere.
    pub fn reset(&mut self) {
        if self.state != ControllerState::Idle {
            log::debug!("session {}: {:?} -> Idle (reset)", self.session_id, self.state);
            self.state = ControllerState::Idle;
        }
    }

    fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.last_tool_call = Some(record);
    }

    fn record_turn(&mut self, turn: Turn) {
        if self.capacity == 0 {
            return;
        }
        while self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(turn);
    }
}

/// Rolls the session back to `Idle` unless the turn finishes normally.
struct TurnGuard<'a> {
    state: &'a mut ConversationState,
    finished: bool,
}

impl<'a> TurnGuard<'a> {
    fn begin(state: &'a mut ConversationState) -> AgentResult<Self> {
        state.reset();
        state.transition(ControllerState::Interpreting)?;
        Ok(Self {
            state,
            finished: false,
        })
    }

    fn finish(mut self, turn: Turn) -> AgentResult<()> {
        self.state.transition(ControllerState::Idle)?;
        self.state.record_turn(turn);
        self.finished = true;
        Ok(())
    }
}

impl Deref for TurnGuard<'_> {
    type Target = ConversationState;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl DerefMut for TurnGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "session {}: turn abandoned in {:?}, returning to Idle",
                self.state.session_id,
                self.state.state
            );
            self.state.reset();
        }
    }
}

/// The outcome of one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,

    /// What the controller decided to do with the message.
    pub action: Action,

    /// Query service calls made during the turn (zero or one).
    pub tool_calls: Vec<QueryRequest>,

    /// Songs the reply is based on; empty unless a tool call succeeded.
    pub recommendations: Vec<Recommendation>,

    /// The turn hit a failure and `text` is a fallback.
    pub fallback: bool,
}

impl Reply {
    fn plain(text: String, action: Action) -> Self {
        Self {
            text,
            action,
            tool_calls: Vec::new(),
            recommendations: Vec::new(),
            fallback: false,
        }
    }
}

/// Shared decision logic: classifier, tool, and optional generation port.
#[derive(Debug)]
pub struct Controller {
    service: QueryService,
    classifier: IntentClassifier,
    port: Option<Arc<dyn GenerationPort>>,
    generation_timeout: Duration,
    temperature: f32,
    history_turns: usize,
}

impl Controller {
    pub fn new(service: QueryService, classifier: IntentClassifier) -> Self {
        Self {
            service,
            classifier,
            port: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            temperature: 0.0,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    /// Build a controller from configuration. The generation port is only
    /// attached when an API key is available.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Lexicon`] when a configured lexicon cannot be
    /// loaded, or [`AgentError::Request`] if the HTTP client fails to build.
    pub fn from_config(config: &Config, service: QueryService) -> AgentResult<Self> {
        let lexicon =
            DescriptorLexicon::load_or_builtin(config.conversation.lexicon_path.as_deref())?;
        let classifier = IntentClassifier::new(&lexicon)?;

        let mut controller = Self::new(service, classifier)
            .with_timeout(config.llm.timeout())
            .with_temperature(config.llm.temperature)
            .with_history_turns(config.conversation.history_turns);

        match GroqClient::new(&config.llm) {
            Ok(client) => {
                log::info!(
                    "Replies phrased by {} ({})",
                    config.llm.provider,
                    client.model()
                );
                controller = controller.with_port(Arc::new(client));
            }
            Err(AgentError::MissingApiKey { provider }) => {
                log::warn!("No API key for {provider}; replies use plain templates");
            }
            Err(e) => return Err(e),
        }
        Ok(controller)
    }

    #[must_use]
    pub fn with_port(mut self, port: Arc<dyn GenerationPort>) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub const fn service(&self) -> &QueryService {
        &self.service
    }

    pub fn has_port(&self) -> bool {
        self.port.is_some()
    }

    /// Open a new session.
    pub fn session(self: &Arc<Self>) -> Session {
        let state = ConversationState::new(SessionId::new(), self.history_turns);
        log::debug!("session {} opened", state.session_id());
        Session {
            controller: Arc::clone(self),
            state,
        }
    }

    async fn run_turn(&self, guard: &mut TurnGuard<'_>, message: &str) -> AgentResult<Reply> {
        let action = self.classifier.classify(message);
        log::debug!("session {}: classified as {:?}", guard.session_id(), action);

        match action {
            Action::ToolCall(request) => {
                guard.transition(ControllerState::ToolCalling)?;
                self.tool_turn(guard, message, request).await
            }
            Action::Clarify(reason) => {
                guard.transition(ControllerState::Clarifying)?;
                guard.transition(ControllerState::Responding)?;
                Ok(Reply::plain(compose::clarify(&reason), Action::Clarify(reason)))
            }
            Action::DirectReply(kind) => {
                guard.transition(ControllerState::DirectReply)?;
                let (text, fallback) = if self.port.is_some() {
                    let mut messages = vec![ChatMessage::system(compose::CHAT_PROMPT)];
                    for turn in guard.history() {
                        messages.push(ChatMessage::user(turn.user.clone()));
                        messages.push(ChatMessage::assistant(turn.reply.clone()));
                    }
                    messages.push(ChatMessage::user(message));
                    match self.generate(messages).await {
                        Ok(text) => (text, false),
                        Err(e) => {
                            log::warn!("session {}: generation failed: {}", guard.session_id(), e);
                            (compose::direct_reply(kind), true)
                        }
                    }
                } else {
                    (compose::direct_reply(kind), false)
                };
                guard.transition(ControllerState::Responding)?;
                Ok(Reply {
                    fallback,
                    ..Reply::plain(text, Action::DirectReply(kind))
                })
            }
        }
    }

    async fn tool_turn(
        &self,
        guard: &mut TurnGuard<'_>,
        message: &str,
        request: ToolRequest,
    ) -> AgentResult<Reply> {
        let k = i64::try_from(request.k().unwrap_or_else(|| self.service.default_k()))
            .unwrap_or(i64::MAX);

        let (query, explainer) = match &request {
            ToolRequest::Descriptors { descriptors, .. } => (
                QueryRequest::by_text(descriptor_query(descriptors), k),
                self.explainer_for(descriptors),
            ),
            ToolRequest::SimilarTo { title, .. } => match self.service.resolve_title(title) {
                Ok(Some(SongSummary {
                    doc_id,
                    title,
                    artist,
                })) => (QueryRequest::by_id(doc_id, k), Explainer::for_song(title, artist)),
                Ok(None) => {
                    log::info!("session {}: unknown title {:?}", guard.session_id(), title);
                    guard.transition(ControllerState::Clarifying)?;
                    guard.transition(ControllerState::Responding)?;
                    let reason = ClarifyReason::UnknownTitle(title.clone());
                    return Ok(Reply::plain(compose::clarify(&reason), Action::Clarify(reason)));
                }
                Err(e) => {
                    log::warn!("session {}: title lookup failed: {}", guard.session_id(), e);
                    guard.transition(ControllerState::Responding)?;
                    return Ok(Reply {
                        fallback: true,
                        ..Reply::plain(
                            compose::tool_failure(e.is_unavailable()),
                            Action::ToolCall(request.clone()),
                        )
                    });
                }
            },
        };

        log::info!(
            "session {}: tool call recommend(text={:?}, doc_id={:?}, k={})",
            guard.session_id(),
            query.text,
            query.doc_id.as_ref().map(|id| id.as_str()),
            query.k
        );
        let outcome = self.service.query_async(query.clone()).await;
        let tool_calls = vec![query.clone()];

        match outcome {
            Ok(result) => {
                guard.record_tool_call(ToolCallRecord {
                    request: query,
                    outcome: Ok(result.clone()),
                });
                guard.transition(ControllerState::Responding)?;

                let templated = explainer.compose(&result);
                let (text, fallback) = if result.is_empty() {
                    (templated, false)
                } else {
                    self.rephrase(message, templated).await
                };
                Ok(Reply {
                    text,
                    action: Action::ToolCall(request),
                    tool_calls,
                    recommendations: result.results,
                    fallback,
                })
            }
            Err(e) => {
                let e = AgentError::ToolCall(e);
                log::warn!("session {}: {}", guard.session_id(), e);
                let unavailable = matches!(&e, AgentError::ToolCall(inner) if inner.is_unavailable());
                guard.record_tool_call(ToolCallRecord {
                    request: query,
                    outcome: Err(e.to_string()),
                });
                guard.transition(ControllerState::Responding)?;
                Ok(Reply {
                    text: compose::tool_failure(unavailable),
                    action: Action::ToolCall(request),
                    tool_calls,
                    recommendations: Vec::new(),
                    fallback: true,
                })
            }
        }
    }

    /// Map every vocabulary form of each descriptor back to the word the
    /// user typed.
    fn explainer_for(&self, descriptors: &[Descriptor]) -> Explainer {
        let mut terms = HashMap::new();
        for descriptor in descriptors {
            for word in descriptor_words(descriptor) {
                if let Ok(Some(term)) = self.service.normalize_word(&word) {
                    terms.entry(term).or_insert_with(|| descriptor.word.clone());
                }
            }
        }
        Explainer::new(Anchor::Descriptors(descriptors.to_vec()), terms)
    }

    /// Ask the port to phrase `templated`; keep `templated` if it cannot.
    async fn rephrase(&self, message: &str, templated: String) -> (String, bool) {
        if self.port.is_none() {
            return (templated, false);
        }
        let messages = vec![
            ChatMessage::system(compose::FORMAT_PROMPT),
            ChatMessage::user(compose::format_request(message, &templated)),
        ];
        match self.generate(messages).await {
            Ok(text) => (text, false),
            Err(e) => {
                log::warn!("Reply phrasing failed, using template: {e}");
                (templated, true)
            }
        }
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> AgentResult<String> {
        let Some(port) = &self.port else {
            return Err(AgentError::MissingApiKey {
                provider: "none".to_string(),
            });
        };
        let request = GenerationRequest::new(messages).with_temperature(self.temperature);
        let response = tokio::time::timeout(self.generation_timeout, port.generate(request))
            .await
            .map_err(|_| AgentError::UpstreamTimeout {
                provider: port.provider().to_string(),
                timeout: self.generation_timeout,
            })??;

        let text = strip_thinking(&response.text);
        if text.is_empty() {
            return Err(AgentError::Parse {
                provider: port.provider().to_string(),
                message: "empty reply".to_string(),
            });
        }
        Ok(text)
    }
}

/// A conversation with one user.
#[derive(Debug)]
pub struct Session {
    controller: Arc<Controller>,
    state: ConversationState,
}

impl Session {
    pub const fn id(&self) -> SessionId {
        self.state.session_id()
    }

    pub const fn state(&self) -> ControllerState {
        self.state.state()
    }

    pub const fn conversation(&self) -> &ConversationState {
        &self.state
    }

    /// Handle one user message.
    ///
    /// Failures never escape: a failed tool call or generation becomes a
    /// fallback reply, and the session is back in `Idle` when this returns.
    /// If the returned future is dropped before completion the session is
    /// also reset to `Idle`.
    pub async fn handle_turn(&mut self, message: &str) -> Reply {
        let controller = Arc::clone(&self.controller);
        let mut guard = match TurnGuard::begin(&mut self.state) {
            Ok(guard) => guard,
            Err(e) => return internal_failure(&e),
        };

        let reply = match controller.run_turn(&mut guard, message).await {
            Ok(reply) => reply,
            Err(e) => return internal_failure(&e),
        };

        let turn = Turn {
            user: message.to_string(),
            reply: reply.text.clone(),
            action: reply.action.clone(),
        };
        if let Err(e) = guard.finish(turn) {
            return internal_failure(&e);
        }
        reply
    }
}

fn internal_failure(error: &AgentError) -> Reply {
    log::error!("Turn failed: {error}");
    Reply {
        fallback: true,
        ..Reply::plain(
            "Sorry, something went wrong on my side. Please try again.".to_string(),
            Action::Clarify(ClarifyReason::Empty),
        )
    }
}

/// Words a descriptor contributes to the query: what the user said, the
/// lexicon term, and related lyric vocabulary.
fn descriptor_words(descriptor: &Descriptor) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let sources = descriptor
        .word
        .split(' ')
        .chain(descriptor.term.split(' '))
        .chain(descriptor.related.iter().map(String::as_str));
    for word in sources {
        if !word.is_empty() && !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

/// Free-text query for a set of descriptors.
fn descriptor_query(descriptors: &[Descriptor]) -> String {
    let mut words: Vec<String> = Vec::new();
    for descriptor in descriptors {
        for word in descriptor_words(descriptor) {
            if !words.contains(&word) {
                words.push(word);
            }
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(word: &str, term: &str, related: &[&str]) -> Descriptor {
        Descriptor {
            word: word.to_string(),
            term: term.to_string(),
            group: "mood".to_string(),
            related: related.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_state_machine_edges() {
        use ControllerState::*;
        assert!(Idle.can_transition_to(Interpreting));
        assert!(Interpreting.can_transition_to(ToolCalling));
        assert!(ToolCalling.can_transition_to(Clarifying));
        assert!(Responding.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(ToolCalling));
        assert!(!ToolCalling.can_transition_to(Idle));
        assert!(!DirectReply.can_transition_to(ToolCalling));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut state = ConversationState::new(SessionId::new(), 2);
        let err = state.transition(ControllerState::Responding).unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
        assert_eq!(state.state(), ControllerState::Idle);
    }

    #[test]
    fn test_abandoned_turn_resets_to_idle() {
        let mut state = ConversationState::new(SessionId::new(), 2);
        {
            let mut guard = TurnGuard::begin(&mut state).unwrap();
            guard.transition(ControllerState::ToolCalling).unwrap();
        }
        assert_eq!(state.state(), ControllerState::Idle);
        assert_eq!(state.turns(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = ConversationState::new(SessionId::new(), 2);
        for n in 0..3 {
            state.record_turn(Turn {
                user: n.to_string(),
                reply: String::new(),
                action: Action::Clarify(ClarifyReason::Empty),
            });
        }
        let users: Vec<&str> = state.history().map(|t| t.user.as_str()).collect();
        assert_eq!(users, vec!["1", "2"]);
    }

    #[test]
    fn test_descriptor_query_deduplicates() {
        let query = descriptor_query(&[
            descriptor("feel good", "upbeat", &["happy", "dance"]),
            descriptor("soulful", "soulful", &["soul", "dance"]),
        ]);
        assert_eq!(query, "feel good upbeat happy dance soulful soul");
    }
}
