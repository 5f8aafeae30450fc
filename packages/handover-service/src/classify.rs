use crate::Providers;
use handover_config::LlmProviderConfig;
use handover_domain::{
	conversation::{SenderRole, TranscriptMessage},
	decision::HandoverCriteria,
	verdict::Verdict,
};
use handover_providers::{
	Error as ProviderError,
	classifier::{ChatMessage, ChatRole},
};

pub const STRICT_JSON_INSTRUCTION: &str = "Your previous reply was not valid. Reply with a single \
JSON object and nothing else. Required keys: score (integer 0-100), triggeredCriteria (array of \
strings), urgencyLevel (\"low\", \"medium\", or \"high\"), detectedIntents (array of strings).";

pub fn system_prompt(persona: &str, criteria: &HandoverCriteria) -> String {
	let escalation = criteria.escalation_phrases.join("; ");
	let buying = criteria.buying_signals.join("; ");

	format!(
		"{persona}\n\n\
Assess whether this lead should be handed to a human sales representative.\n\
Escalation criteria: the lead asks for a person ({escalation}), or shows strong buying intent \
({buying}).\n\
A score of {threshold} or more means the lead is qualified.\n\n\
Reply with a JSON object: {{\"score\": 0-100, \"triggeredCriteria\": [string], \
\"urgencyLevel\": \"low\" | \"medium\" | \"high\", \"detectedIntents\": [string]}}. \
List a criterion in triggeredCriteria only when the lead clearly asked for a human or is ready \
to act now.",
		threshold = criteria.score_threshold,
	)
}

/// Builds the chat history: lead turns become `user`, ai and human turns become `assistant`, and
/// the latest lead turn is always the final message.
pub fn build_messages(system: String, transcript: &[TranscriptMessage]) -> Vec<ChatMessage> {
	let latest_lead = transcript.iter().rposition(|message| message.role == SenderRole::Lead);
	let mut messages = Vec::with_capacity(transcript.len() + 1);

	messages.push(ChatMessage::new(ChatRole::System, system));

	for (index, message) in transcript.iter().enumerate() {
		if Some(index) == latest_lead {
			continue;
		}

		messages.push(chat_message(message));
	}

	if let Some(index) = latest_lead {
		messages.push(chat_message(&transcript[index]));
	}

	messages
}

/// Classifies with one strict-JSON retry after a malformed reply. Any remaining failure yields
/// `None` so the caller falls back to rule-only evaluation.
pub async fn classify_or_fallback(
	providers: &Providers,
	cfg: &LlmProviderConfig,
	mut messages: Vec<ChatMessage>,
) -> Option<Verdict> {
	let first = providers.classifier.classify(cfg, &messages).await;
	let err = match first {
		Ok(verdict) => return Some(verdict),
		Err(err) => err,
	};
	let err = match err {
		ProviderError::MalformedResponse { message } => {
			tracing::debug!(
				error = %message,
				"Classifier reply was malformed. Retrying with strict JSON."
			);

			messages.push(ChatMessage::new(ChatRole::User, STRICT_JSON_INSTRUCTION));

			match providers.classifier.classify(cfg, &messages).await {
				Ok(verdict) => return Some(verdict),
				Err(err) => err,
			}
		},
		other => other,
	};

	tracing::warn!(
		provider_id = %cfg.provider_id,
		error = %err,
		"Classifier unavailable. Falling back to rule-only evaluation."
	);

	None
}

fn chat_message(message: &TranscriptMessage) -> ChatMessage {
	let role = match message.role {
		SenderRole::Lead => ChatRole::User,
		SenderRole::Ai | SenderRole::Human => ChatRole::Assistant,
	};

	ChatMessage::new(role, message.content.clone())
}

#[cfg(test)]
mod tests {
	use time::{Duration, OffsetDateTime};

	use super::*;

	fn turn(role: SenderRole, content: &str, minute: i64) -> TranscriptMessage {
		TranscriptMessage {
			role,
			content: content.to_string(),
			sent_at: OffsetDateTime::UNIX_EPOCH + Duration::minutes(minute),
		}
	}

	#[test]
	fn latest_lead_turn_is_last() {
		let transcript = vec![
			turn(SenderRole::Ai, "Hi! Interested in the Civic?", 0),
			turn(SenderRole::Lead, "Yes, can I test drive it?", 1),
			turn(SenderRole::Human, "I'll check availability.", 2),
		];
		let messages = build_messages("system".to_string(), &transcript);
		let roles: Vec<ChatRole> = messages.iter().map(|message| message.role).collect();

		assert_eq!(roles, vec![
			ChatRole::System,
			ChatRole::Assistant,
			ChatRole::Assistant,
			ChatRole::User
		]);
		assert_eq!(messages[3].content, "Yes, can I test drive it?");
	}

	#[test]
	fn prompt_names_threshold_and_phrases() {
		let criteria = HandoverCriteria::from_config(&handover_config::Handover::default());
		let prompt = system_prompt("You are Ava.", &criteria);

		assert!(prompt.starts_with("You are Ava."));
		assert!(prompt.contains("speak to a human"));
		assert!(prompt.contains("test drive"));
		assert!(prompt.contains("80 or more"));
	}
}
