use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};
use handover_domain::verdict::{self, Verdict};

const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
	System,
	User,
	Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
	pub role: ChatRole,
	pub content: String,
}
impl ChatMessage {
	pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
		Self { role, content: content.into() }
	}
}

/// Requests a JSON-mode chat completion and validates the verdict it carries.
///
/// Non-2xx statuses and transport failures are `Classification` errors. Content that is not
/// JSON or fails the verdict schema is `MalformedResponse`. No retry happens here.
pub async fn classify(
	cfg: &handover_config::LlmProviderConfig,
	messages: &[ChatMessage],
) -> Result<Verdict> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"response_format": { "type": "json_object" },
		"messages": messages,
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(|err| Error::Classification { status: None, message: err.to_string() })?;
	let status = res.status();
	let text = res.text().await.map_err(|err| Error::Classification {
		status: Some(status.as_u16()),
		message: err.to_string(),
	})?;

	if !status.is_success() {
		let snippet: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();

		return Err(Error::Classification {
			status: Some(status.as_u16()),
			message: format!("HTTP {}: {snippet}", status.as_u16()),
		});
	}

	let json: Value = serde_json::from_str(&text).map_err(|_| Error::MalformedResponse {
		message: "Response body is not valid JSON.".to_string(),
	})?;
	let content = parse_classifier_json(json)?;

	verdict::parse_verdict(&content)
		.map_err(|err| Error::MalformedResponse { message: err.to_string() })
}

fn parse_classifier_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
	{
		return match content {
			Value::String(raw) => serde_json::from_str(strip_code_fence(raw)).map_err(|_| {
				Error::MalformedResponse { message: "Message content is not valid JSON.".to_string() }
			}),
			Value::Object(_) => Ok(content.clone()),
			_ => Err(Error::MalformedResponse {
				message: "Message content is not a JSON string.".to_string(),
			}),
		};
	}

	Err(Error::MalformedResponse { message: "Response is missing message content.".to_string() })
}

fn strip_code_fence(raw: &str) -> &str {
	let trimmed = raw.trim();
	let Some(inner) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}
