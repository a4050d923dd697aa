//! Conversation tests against a real in-memory engine and a stub
//! generation port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use verso_agent::{
    Action, AgentResult, ClarifyReason, Controller, ControllerState, DescriptorLexicon,
    GenerationPort, GenerationRequest, GenerationResponse, IntentClassifier, ToolRequest,
};
use verso_search::corpus::{ingest, load_reader};
use verso_search::{Engine, Preprocessor, QueryService, SearchConfig};

const CORPUS: &str = "\
artist,song,link,text
One,Sunny Soul,,happy happy dance soul heart party
Two,Rain Song,,rain storm thunder night cold
Three,Heartfelt,,soul heart love deep spirit
Four,Party Time,,dance party fun joy celebrate
Five,Lonely,,cry tears alone pain lonely
";

#[derive(Debug)]
struct StubPort {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StubPort {
    fn new(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerationPort for StubPort {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn generate(&self, request: GenerationRequest) -> AgentResult<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(GenerationResponse {
            text: self.reply.clone(),
            model: Some("stub-model".to_string()),
        })
    }
}

fn service(built: bool) -> QueryService {
    let config = SearchConfig::default();
    let engine = Arc::new(Engine::new(config.clone()));
    if built {
        let songs = load_reader(CORPUS.as_bytes(), "corpus").unwrap();
        let report = ingest(songs, &Preprocessor::from_config(&config));
        engine.rebuild(report.documents).unwrap();
    }
    QueryService::new(engine, &config)
}

fn controller(built: bool) -> Controller {
    let classifier = IntentClassifier::new(&DescriptorLexicon::builtin().unwrap()).unwrap();
    Controller::new(service(built), classifier)
}

#[tokio::test]
async fn test_mood_request_makes_one_grounded_tool_call() {
    let controller = Arc::new(controller(true));
    let mut session = controller.session();

    let reply = session.handle_turn("I need something upbeat but soulful").await;

    assert!(!reply.fallback);
    assert_eq!(reply.tool_calls.len(), 1);
    let query = reply.tool_calls[0].text.as_deref().unwrap();
    assert!(query.contains("upbeat"));
    assert!(query.contains("soulful"));

    let titles: Vec<&str> = reply.recommendations.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles.len(), 3);
    assert!(!titles.contains(&"Rain Song"));
    assert!(!titles.contains(&"Lonely"));

    assert!(reply.text.starts_with("Here are songs for \"upbeat\" and \"soulful\":"));
    for rec in &reply.recommendations {
        let line = reply
            .text
            .lines()
            .find(|line| line.contains(rec.title.as_str()))
            .unwrap();
        assert!(line.contains("(fits \""), "no rationale in {line:?}");
    }

    assert_eq!(session.state(), ControllerState::Idle);
    let record = session.conversation().last_tool_call().unwrap();
    assert!(record.outcome.is_ok());
}

#[tokio::test]
async fn test_port_rephrases_and_thinking_is_stripped() {
    let port = StubPort::new("<think>pick the best</think>\nTry Heartfelt and Sunny Soul.");
    let controller = Arc::new(controller(true).with_port(port.clone()));
    let mut session = controller.session();

    let reply = session.handle_turn("something soulful").await;

    assert_eq!(reply.text, "Try Heartfelt and Sunny Soul.");
    assert!(!reply.fallback);
    assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    let requests = port.requests.lock().unwrap();
    let prompt = &requests[0].messages[1].content;
    assert!(prompt.contains("Heartfelt"));
}

#[tokio::test]
async fn test_unavailable_engine_gives_fallback_without_songs() {
    let controller = Arc::new(controller(false));
    let mut session = controller.session();

    let reply = session.handle_turn("play me something sad").await;

    assert!(reply.fallback);
    assert!(reply.recommendations.is_empty());
    assert_eq!(reply.tool_calls.len(), 1);
    assert!(reply.text.contains("isn't available"));
    assert_eq!(session.state(), ControllerState::Idle);
    assert!(session.conversation().last_tool_call().unwrap().outcome.is_err());
}

#[tokio::test]
async fn test_generation_timeout_keeps_templated_reply() {
    let port = StubPort::slow("too late", Duration::from_secs(10));
    let controller = Arc::new(
        controller(true)
            .with_port(port)
            .with_timeout(Duration::from_millis(50)),
    );
    let mut session = controller.session();

    let reply = session.handle_turn("something upbeat").await;

    assert!(reply.fallback);
    assert!(reply.text.starts_with("Here are songs for \"upbeat\":"));
    assert!(!reply.recommendations.is_empty());
    assert_eq!(session.state(), ControllerState::Idle);
    assert_eq!(session.conversation().turns(), 1);
}

#[tokio::test]
async fn test_cancelled_turn_returns_session_to_idle() {
    let port = StubPort::slow("too late", Duration::from_secs(10));
    let controller = Arc::new(controller(true).with_port(port));
    let mut session = controller.session();

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        session.handle_turn("something upbeat"),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(session.state(), ControllerState::Idle);
    assert_eq!(session.conversation().turns(), 0);

    // The session is usable afterwards.
    let reply = session.handle_turn("").await;
    assert_eq!(reply.action, Action::Clarify(ClarifyReason::Empty));
}

#[tokio::test]
async fn test_unknown_title_asks_for_clarification() {
    let controller = Arc::new(controller(true));
    let mut session = controller.session();

    let reply = session.handle_turn("songs like \"Nope Song\"").await;

    assert_eq!(
        reply.action,
        Action::Clarify(ClarifyReason::UnknownTitle("Nope Song".to_string()))
    );
    assert!(reply.tool_calls.is_empty());
    assert!(reply.text.contains("Nope Song"));
    assert_eq!(session.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_known_title_queries_by_document() {
    let controller = Arc::new(controller(true));
    let mut session = controller.session();

    let reply = session.handle_turn("2 songs like \"sunny soul\"").await;

    assert!(matches!(
        reply.action,
        Action::ToolCall(ToolRequest::SimilarTo { k: Some(2), .. })
    ));
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].doc_id.as_ref().unwrap().as_str(), "0000001");
    assert_eq!(reply.tool_calls[0].k, 2);
    assert!(reply.recommendations.len() <= 2);
    assert!(reply.recommendations.iter().all(|r| r.title != "Sunny Soul"));
    assert!(reply.text.starts_with("Here are songs with lyrics like Sunny Soul by One:"));
}

#[tokio::test]
async fn test_direct_reply_skips_the_tool() {
    let controller = Arc::new(controller(true));
    let mut session = controller.session();

    let reply = session.handle_turn("hello there").await;

    assert!(matches!(reply.action, Action::DirectReply(_)));
    assert!(reply.tool_calls.is_empty());
    assert!(!reply.text.is_empty());
}

#[tokio::test]
async fn test_direct_reply_sends_history_to_port() {
    let port = StubPort::new("Hey!");
    let controller = Arc::new(controller(true).with_port(port.clone()));
    let mut session = controller.session();

    session.handle_turn("hello").await;
    let reply = session.handle_turn("thanks").await;

    assert_eq!(reply.text, "Hey!");
    let requests = port.requests.lock().unwrap();
    // system, previous user, previous reply, current user
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(requests[1].messages[0].content, verso_agent::compose::CHAT_PROMPT);
    assert_eq!(requests[1].messages[3].content, "thanks");
}

#[tokio::test]
async fn test_history_is_capped() {
    let controller = Arc::new(controller(true).with_history_turns(2));
    let mut session = controller.session();

    for message in ["hi", "thanks", "bye"] {
        session.handle_turn(message).await;
    }

    let users: Vec<&str> = session
        .conversation()
        .history()
        .map(|turn| turn.user.as_str())
        .collect();
    assert_eq!(users, vec!["thanks", "bye"]);
}
