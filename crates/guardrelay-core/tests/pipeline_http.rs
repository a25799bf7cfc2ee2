//! End-to-end turns through `Pipeline::with_http` with mocked gateway and backend.

use std::time::Duration;

use guardrelay_core::backend::{BackendConfig, CompletionResult};
use guardrelay_core::context::ContextMode;
use guardrelay_core::gateway::GatewayConfig;
use guardrelay_core::{Advisory, ChatSession, Pipeline, PipelineOptions, Role, UnreachablePolicy};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREDENTIAL: &str = "vpsk_live_abcdefabcdefabcdefabcdef0000";

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    }))
}

fn pipeline(server: &MockServer, options: PipelineOptions) -> Pipeline {
    let gateway = GatewayConfig::new(format!("{}/scan", server.uri()), CREDENTIAL);
    let backend = BackendConfig {
        api_url: format!("{}/v1/chat/completions", server.uri()),
        ..BackendConfig::new("sk-test")
    };
    Pipeline::with_http(
        gateway,
        backend,
        options,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_allowed_turn_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "action": "allow" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("Paris"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, PipelineOptions::default());
    let mut session = ChatSession::new();
    let outcome = pipeline
        .run_turn(&mut session, "Capital of France?")
        .await
        .unwrap();

    assert_eq!(outcome.reply(), Some("Paris"));
    assert!(outcome.scan_latency_ms.is_some());
    assert!(outcome.backend_latency_ms.is_some());
    let roles: Vec<Role> = session.conversation().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_blocked_turn_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "blocked",
            "threats": [{ "category": "jailbreak", "severity": "CRITICAL" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("should not happen"))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, PipelineOptions::default());
    let mut session = ChatSession::new();
    let outcome = pipeline.run_turn(&mut session, "DAN mode").await.unwrap();

    assert!(outcome.verdict.is_blocked());
    assert!(outcome.completion.is_none());
    assert_eq!(session.conversation().len(), 1);
}

#[tokio::test]
async fn test_gateway_down_fails_open_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("still here"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, PipelineOptions::default());
    let mut session = ChatSession::new();
    let outcome = pipeline.run_turn(&mut session, "hello").await.unwrap();

    assert_eq!(outcome.reply(), Some("still here"));
    assert!(outcome.failed_open());
    assert!(matches!(
        outcome.advisories.as_slice(),
        [Advisory::GatewayUnreachable {
            failed_open: true,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_gateway_down_fail_closed_withholds_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let options = PipelineOptions {
        on_unreachable: UnreachablePolicy::FailClosed,
        ..Default::default()
    };
    let pipeline = pipeline(&server, options);
    let mut session = ChatSession::new();
    let outcome = pipeline.run_turn(&mut session, "hello").await.unwrap();

    assert!(outcome.is_halted());
    assert!(outcome.verdict.is_unreachable());
}

#[tokio::test]
async fn test_full_history_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "action": "allow" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("ok"))
        .mount(&server)
        .await;

    let options = PipelineOptions {
        context_mode: ContextMode::FullHistory,
        ..Default::default()
    };
    let pipeline = pipeline(&server, options);
    let mut session = ChatSession::new();
    pipeline.run_turn(&mut session, "first").await.unwrap();
    pipeline.run_turn(&mut session, "second").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let last_backend = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/v1/chat/completions")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&last_backend.body).unwrap();
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["first", "ok", "second"]);
}

#[tokio::test]
async fn test_backend_failure_keeps_only_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "action": "allow" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached" }
        })))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, PipelineOptions::default());
    let mut session = ChatSession::new();
    let outcome = pipeline.run_turn(&mut session, "hello").await.unwrap();

    assert_eq!(
        outcome.completion,
        Some(CompletionResult::Failure {
            status_code: 429,
            message: "Rate limit reached".into(),
        })
    );
    assert_eq!(session.conversation().len(), 1);
    assert_eq!(session.turns().len(), 1);
}
