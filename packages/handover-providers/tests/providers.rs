use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_partial_json, header, method, path},
};

use handover_domain::{
	retry::{FAILED_ATTEMPT, RetryPolicy},
	signature,
	verdict::Urgency,
};
use handover_providers::{
	Error,
	classifier::{self, ChatMessage, ChatRole},
	webhook::{WebhookClient, WebhookTarget},
};

fn llm_config(api_base: &str) -> handover_config::LlmProviderConfig {
	handover_config::LlmProviderConfig {
		provider_id: "test".to_string(),
		api_base: api_base.to_string(),
		api_key: "secret".to_string(),
		path: "/v1/chat/completions".to_string(),
		model: "classifier-small".to_string(),
		temperature: 0.0,
		timeout_ms: 2_000,
		default_headers: Map::new(),
	}
}

fn messages() -> Vec<ChatMessage> {
	vec![
		ChatMessage::new(ChatRole::System, "Classify the lead."),
		ChatMessage::new(ChatRole::User, "Can I book a test drive?"),
	]
}

fn completion(content: &str) -> Value {
	serde_json::json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn target(url: String, secret: Option<&str>, max_attempts: u32, base_ms: u64) -> WebhookTarget {
	WebhookTarget {
		url,
		secret: secret.map(str::to_string),
		timeout: Duration::from_millis(500),
		policy: RetryPolicy { max_attempts, base_backoff: Duration::from_millis(base_ms) },
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		handover_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("X-Retries".to_string(), serde_json::json!(3));

	assert!(matches!(
		handover_providers::auth_headers("secret", &defaults),
		Err(Error::InvalidConfig { .. })
	));
}

#[tokio::test]
async fn classify_sends_json_mode_request_and_parses_verdict() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/v1/chat/completions"))
		.and(header("authorization", "Bearer secret"))
		.and(body_partial_json(serde_json::json!({
			"model": "classifier-small",
			"response_format": { "type": "json_object" },
		})))
		.respond_with(ResponseTemplate::new(200).set_body_json(completion(
			r#"{"score": 88, "triggeredCriteria": ["asked for test drive"], "urgencyLevel": "high", "detectedIntents": ["test_drive"]}"#,
		)))
		.expect(1)
		.mount(&server)
		.await;

	let verdict = classifier::classify(&llm_config(&server.uri()), &messages())
		.await
		.expect("Classification should succeed.");

	assert_eq!(verdict.score, 88);
	assert_eq!(verdict.urgency_level, Urgency::High);
	assert_eq!(verdict.triggered_criteria, vec!["asked for test drive".to_string()]);
}

#[tokio::test]
async fn classify_maps_server_errors_to_classification_error() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
		.mount(&server)
		.await;

	let err = classifier::classify(&llm_config(&server.uri()), &messages())
		.await
		.expect_err("503 must fail.");

	assert!(matches!(err, Error::Classification { status: Some(503), .. }));
}

#[tokio::test]
async fn classify_rejects_content_outside_the_schema() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(completion(r#"{"score": 150, "urgencyLevel": "low"}"#)),
		)
		.mount(&server)
		.await;

	let err = classifier::classify(&llm_config(&server.uri()), &messages())
		.await
		.expect_err("Out of range score must fail.");

	assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[tokio::test]
async fn first_success_is_one_signed_attempt() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/hooks/handover"))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;

	let client = WebhookClient::new(target(
		format!("{}/hooks/handover", server.uri()),
		Some("shared-secret"),
		3,
		10,
	))
	.expect("Client should build.");
	let payload = serde_json::json!({ "conversationId": "c-1", "evaluation": { "score": 90 } });
	let report = client.deliver(&payload).await;

	assert!(report.delivered);
	assert_eq!(report.attempts, vec![202]);

	let requests = server.received_requests().await.expect("Recording is enabled.");
	let body: Value = requests[0].body_json().expect("Body should be JSON.");
	let sig = body.get("signature").and_then(Value::as_str).expect("Body should be signed.");

	assert!(signature::verify_payload("shared-secret", &body, sig).is_ok());
	assert!(signature::verify_payload("other-secret", &body, sig).is_err());
}

#[tokio::test]
async fn unsigned_without_secret() {
	let server = MockServer::start().await;

	Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

	let client = WebhookClient::new(target(server.uri(), None, 3, 10)).expect("Client should build.");
	let report = client.deliver(&serde_json::json!({ "id": 1 })).await;
	let requests = server.received_requests().await.expect("Recording is enabled.");
	let body: Value = requests[0].body_json().expect("Body should be JSON.");

	assert!(report.delivered);
	assert!(body.get("signature").is_none());
}

#[tokio::test]
async fn server_errors_exhaust_attempts_with_backoff() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(500))
		.expect(3)
		.mount(&server)
		.await;

	let client =
		WebhookClient::new(target(server.uri(), Some("s"), 3, 1_000)).expect("Client should build.");
	let started = Instant::now();
	let report = client.deliver(&serde_json::json!({ "id": 1 })).await;

	assert!(!report.delivered);
	assert_eq!(report.attempts, vec![500, 500, 500]);
	assert_eq!(report.error.as_deref(), Some("HTTP 500"));
	assert!(started.elapsed() >= Duration::from_millis(3_000));
}

#[tokio::test]
async fn timeouts_record_failed_attempts_and_recover() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

	let client = WebhookClient::new(target(server.uri(), None, 3, 10)).expect("Client should build.");
	let report = client.deliver(&serde_json::json!({ "id": 1 })).await;

	assert!(report.delivered);
	assert_eq!(report.attempts, vec![FAILED_ATTEMPT, 200]);
}

#[tokio::test]
async fn unreachable_endpoint_never_errors() {
	let client = WebhookClient::new(target("http://127.0.0.1:9/unreachable".to_string(), None, 2, 10))
		.expect("Client should build.");
	let report = client.deliver(&serde_json::json!({ "id": 1 })).await;

	assert!(!report.delivered);
	assert_eq!(report.attempts, vec![FAILED_ATTEMPT, FAILED_ATTEMPT]);
	assert!(report.error.is_some());
}
