//! Router-level tests: requests go through `build_router` via `oneshot`;
//! the model endpoint and the DNS API are throwaway local axum servers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::Query,
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ai_agent::agent::Agent;
use ai_agent::api::{AppState, build_router};
use ai_agent::config::{self, Config};
use ai_agent::llm::providers;
use ai_agent::llm::service::LlmService;
use ai_agent::sse::{SseFrame, SseParser};
use ai_agent::tools::{Tool, ToolBox, dns::DnsTool};

// ── Harness ───────────────────────────────────────────────────────────────────

fn state_from(config: Config) -> AppState {
    let provider = providers::build(&config.llm, config.templates.context.max_tokens, None).unwrap();
    let llm = LlmService::from_config(provider, &config.llm);
    let dns = DnsTool::from_config(&config.dns).unwrap();
    let agent = Agent::new(llm.clone(), ToolBox::new().with(Tool::Dns(dns)), config.agent.max_tool_rounds);
    AppState::new(config, llm, agent, CancellationToken::new())
}

fn dummy_router(extra_toml: &str) -> Router {
    let config = config::parse(&format!("[llm]\ntype = \"dummy\"\n{extra_toml}"), None).unwrap();
    build_router(state_from(config))
}

/// Router backed by an OpenAI-compatible endpoint at `model_url` and a DNS
/// API at `dns_url`.
fn remote_router(model_url: &str, dns_url: &str) -> Router {
    remote_router_with(model_url, dns_url, "")
}

fn remote_router_with(model_url: &str, dns_url: &str, extra_toml: &str) -> Router {
    let text = format!(
        r#"
[llm]
type = "doubao"
[llm.doubao]
base_url = "{model_url}/v1"
model = "test-model"
[dns]
base_url = "{dns_url}"
{extra_toml}
"#
    );
    build_router(state_from(config::parse(&text, None).unwrap()))
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_frames(resp: Response) -> Vec<SseFrame> {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let mut parser = SseParser::new();
    let mut frames = parser.feed_bytes(&bytes);
    frames.extend(parser.finish());
    frames
}

fn content_type(resp: &Response) -> String {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn completion(content: &str) -> Value {
    json!({ "choices": [{ "message": { "content": content } }] })
}

// ── Basic routes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_pongs() {
    let resp = dummy_router("")
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "message": "pong" }));
}

#[tokio::test]
async fn bundled_default_config_parses() {
    let cfg = config::load_from(Path::new("config/default.toml"), None).unwrap();
    assert_eq!(cfg.server.bind, "127.0.0.1:8800");
    assert_eq!(cfg.dns.default_domain, "gopron.cn");
    assert!(cfg.llm.active().is_some());
}

// ── /api/chat ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_rejects_blank_question() {
    let resp = dummy_router("").oneshot(post_json("/api/chat", json!({ "question": "   " }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"], "invalid parameters");
    assert_eq!(body["data"], "");
}

#[tokio::test]
async fn chat_rejects_malformed_json() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"question\":"))
        .unwrap();
    let resp = dummy_router("").oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!body_json(resp).await["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_rejects_oversized_body() {
    let router = dummy_router("[server]\nmax_body_bytes = 64\n");
    let question = "x".repeat(1024);
    let resp = router.oneshot(post_json("/api/chat", json!({ "question": question }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn chat_returns_envelope_with_answer() {
    let resp = dummy_router("").oneshot(post_json("/api/chat", json!({ "question": "hello" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({ "status": 200, "message": "ok", "data": "[echo] hello" })
    );
}

#[tokio::test]
async fn chat_stream_relays_trimmed_deltas_then_done() {
    let resp = dummy_router("")
        .oneshot(post_json("/api/chat", json!({ "question": "hello streaming world", "stream": true })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(content_type(&resp).starts_with("text/event-stream"));

    let frames = body_frames(resp).await;
    let (messages, rest) = frames.split_at(frames.len() - 1);
    let data: Vec<&str> = messages.iter().map(|f| f.data.as_str()).collect();
    assert_eq!(data, ["[echo]", "hello", "streaming", "world"]);
    let ids: Vec<&str> = messages.iter().map(|f| f.id.as_deref().unwrap()).collect();
    assert_eq!(ids, ["1", "2", "3", "4"]);
    assert!(messages.iter().all(|f| f.event_type() == "message"));
    assert_eq!(rest[0].event_type(), "done");
}

#[tokio::test]
async fn enable_stream_is_the_default_and_request_overrides_it() {
    let router = dummy_router("[templates.context]\nenable_stream = true\n");

    let resp = router.clone().oneshot(post_json("/api/chat", json!({ "question": "hi" }))).await.unwrap();
    assert!(content_type(&resp).starts_with("text/event-stream"));

    let resp = router.oneshot(post_json("/api/chat", json!({ "question": "hi", "stream": false }))).await.unwrap();
    assert!(content_type(&resp).starts_with("application/json"));
    assert_eq!(body_json(resp).await["data"], "[echo] hi");
}

#[tokio::test]
async fn chat_applies_templates() {
    let extra = r#"
[templates.system]
role = "operator"
style = "terse"
content = "You are an {role}, be {style}."
[templates.user]
template = "Q: {question}"
"#;
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let sink = seen.clone();
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(body);
                Json(completion("ok"))
            }
        }),
    ))
    .await;

    let text = format!(
        "[llm]\ntype = \"aliyun\"\n[llm.aliyun]\nbase_url = \"{model}/v1\"\nmodel = \"qwen\"\n{extra}"
    );
    let router = build_router(state_from(config::parse(&text, None).unwrap()));
    let resp = router.oneshot(post_json("/api/chat", json!({ "question": "ttl?" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = seen.lock().unwrap().take().unwrap();
    assert_eq!(body["model"], "qwen");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "You are an operator, be terse.");
    assert_eq!(body["messages"][1]["content"], "Q: ttl?");
}

#[tokio::test]
async fn stream_error_becomes_error_event() {
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            let body = concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
                "data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }),
    ))
    .await;

    let resp = remote_router(&model, "http://127.0.0.1:9/")
        .oneshot(post_json("/api/chat", json!({ "question": "hi", "stream": true })))
        .await
        .unwrap();
    let frames = body_frames(resp).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, "Hi");
    assert_eq!(frames[1].event_type(), "error");
    assert!(frames[1].data.contains("quota exceeded"));
}

#[tokio::test]
async fn upstream_failure_maps_to_500() {
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "message": "bad key" } })))
        }),
    ))
    .await;

    let resp = remote_router(&model, "http://127.0.0.1:9/")
        .oneshot(post_json("/api/chat", json!({ "question": "hi" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "model call failed");
    assert!(body["error"].as_str().unwrap().contains("bad key"));
}

#[tokio::test]
async fn slow_model_times_out_with_504() {
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(completion("too late"))
        }),
    ))
    .await;

    let resp = remote_router_with(&model, "http://127.0.0.1:9/", "[server]\nrequest_timeout_seconds = 1")
        .oneshot(post_json("/api/chat", json!({ "question": "hi", "stream": false })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(resp).await;
    assert_eq!(body["status"], 504);
    assert_eq!(body["message"], "request timed out");
    assert_eq!(body["error"], "no reply within 1s");
}

// ── /api/chat2 ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_with_echo_model_answers_directly() {
    let resp = dummy_router("").oneshot(post_json("/api/chat2", json!({ "question": "hi" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["answer"], "[echo] hi");
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn agent_queries_dns_api_and_answers() {
    let dns_seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = dns_seen.clone();
    let dns = spawn(Router::new().route(
        "/api/dns/records",
        get(move |Query(q): Query<std::collections::HashMap<String, String>>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(format!("{}/{}", q["domain"], q["rr"]));
                Json(json!({ "success": true, "message": "ok", "data": [{ "rr": "www", "type": "A", "value": "1.2.3.4" }] }))
            }
        }),
    ))
    .await;

    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            let msgs = body["messages"].as_array().cloned().unwrap_or_default();
            let last = msgs.last().cloned().unwrap_or(Value::Null);
            if last["role"] == "tool" {
                let out: Value = serde_json::from_str(last["content"].as_str().unwrap()).unwrap();
                Json(completion(&format!("www.test.cn points to {}", out["data"][0]["value"].as_str().unwrap())))
            } else {
                Json(json!({ "choices": [{ "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "aliyun_dns_operator",
                            "arguments": "{\"action\":\"query\",\"domain\":\"test.cn\",\"rr\":\"www\"}"
                        }
                    }]
                }}]}))
            }
        }),
    ))
    .await;

    let resp = remote_router(&model, &format!("{dns}/"))
        .oneshot(post_json("/api/chat2", json!({ "question": "what does www.test.cn resolve to?" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["data"]["answer"], "www.test.cn points to 1.2.3.4");
    let roles: Vec<&str> = body["data"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["assistant", "tool", "assistant"]);
    assert_eq!(dns_seen.lock().unwrap().as_slice(), ["test.cn/www"]);
}

// ── /api/intent ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn intent_summarises_fenced_operation() {
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(completion(
                "```json\n{\"action\":\"create\",\"rr\":\"test\",\"type\":\"A\",\"value\":\"192.168.1.102\",\"ttl\":300}\n```",
            ))
        }),
    ))
    .await;

    let resp = remote_router(&model, "http://127.0.0.1:9/")
        .oneshot(post_json("/api/intent", json!({ "question": "point test at 192.168.1.102" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await["data"],
        "created DNS record: test.gopron.cn A record pointing to 192.168.1.102"
    );
}

#[tokio::test]
async fn intent_with_unparseable_reply_is_500() {
    let resp = dummy_router("").oneshot(post_json("/api/intent", json!({ "question": "hi" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["message"], "intent analysis failed");
}

#[tokio::test]
async fn intent_unsupported_action_is_500() {
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(completion("{\"action\":\"enable\",\"rr\":\"www\"}")) }),
    ))
    .await;

    let resp = remote_router(&model, "http://127.0.0.1:9/")
        .oneshot(post_json("/api/intent", json!({ "question": "enable www" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "DNS operation failed");
    assert!(body["error"].as_str().unwrap().contains("enable"));
}

#[tokio::test]
async fn intent_without_action_falls_back_to_chat() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let model = spawn(Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Json(completion("{\"action\":\"\",\"rr\":\"\"}"))
                } else {
                    Json(completion("DNS maps names to addresses."))
                }
            }
        }),
    ))
    .await;

    let resp = remote_router(&model, "http://127.0.0.1:9/")
        .oneshot(post_json("/api/intent", json!({ "question": "what is DNS?" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"], "DNS maps names to addresses.");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
