use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
	Lead,
	Ai,
	Human,
}
impl SenderRole {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Lead => "lead",
			Self::Ai => "ai",
			Self::Human => "human",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"lead" => Some(Self::Lead),
			"ai" => Some(Self::Ai),
			"human" => Some(Self::Human),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
	pub role: SenderRole,
	pub content: String,
	#[serde(with = "time::serde::rfc3339")]
	pub sent_at: OffsetDateTime,
}

/// Lifecycle of a conversation with respect to automated evaluation.
///
/// `Active → Evaluating → {HandedOver | Active}`. `HandedOver` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
	Active,
	Evaluating,
	HandedOver,
}
impl ConversationState {
	pub fn from_handover_completed(handover_completed: bool) -> Self {
		if handover_completed { Self::HandedOver } else { Self::Active }
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::HandedOver)
	}

	pub fn begin_evaluation(self) -> Result<Self, TransitionError> {
		match self {
			Self::Active => Ok(Self::Evaluating),
			from => Err(TransitionError { from, to: Self::Evaluating }),
		}
	}

	pub fn finish_evaluation(self, handed_over: bool) -> Result<Self, TransitionError> {
		let to = Self::from_handover_completed(handed_over);

		match self {
			Self::Evaluating => Ok(to),
			from => Err(TransitionError { from, to }),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Conversation cannot move from {from:?} to {to:?}.")]
pub struct TransitionError {
	pub from: ConversationState,
	pub to: ConversationState,
}

/// Extracts and lowercases the address from `Name <addr@host>` or a bare address.
pub fn normalize_email(raw: &str) -> Option<String> {
	let trimmed = raw.trim();
	let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
		(Some(open), Some(close)) if open < close => &trimmed[open + 1..close],
		_ => trimmed,
	};
	let address = address.trim().to_lowercase();
	let (local, domain) = address.split_once('@')?;

	if local.is_empty()
		|| domain.is_empty()
		|| domain.contains('@')
		|| address.chars().any(char::is_whitespace)
	{
		return None;
	}

	Some(address)
}

/// Display name from `"Jane Doe" <jane@example.com>`, if present.
pub fn display_name(raw: &str) -> Option<String> {
	let open = raw.find('<')?;
	let name = raw[..open].trim().trim_matches('"').trim();

	if name.is_empty() { None } else { Some(name.to_string()) }
}

/// Key that serializes work on one thread before the conversation row is known.
pub fn correlation_key(lead_email: &str, inbox: &str) -> String {
	format!("{lead_email}|{inbox}")
}

pub fn lead_turns(transcript: &[TranscriptMessage]) -> impl Iterator<Item = &TranscriptMessage> {
	transcript.iter().filter(|message| message.role == SenderRole::Lead)
}
