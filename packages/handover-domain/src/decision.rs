//! Handover decision engine.
//!
//! `evaluate` is pure: it blends campaign rule thresholds, the classifier verdict (when one is
//! available), deterministic phrase signals, and manual requests into one immutable
//! [`HandoverEvaluation`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	brief::{self, BriefInput, SalesBrief},
	conversation::{TranscriptMessage, lead_turns},
	signals::{self, Signal, SignalMatcher},
	verdict::{Urgency, Verdict},
};

pub const MANUAL_CRITERION: &str = "manual_request";

const MAX_PHRASES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverReason {
	IntentTrigger,
	Manual,
	RuleThreshold,
}
impl HandoverReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::IntentTrigger => "intent_trigger",
			Self::Manual => "manual",
			Self::RuleThreshold => "rule_threshold",
		}
	}
}

/// Effective thresholds for one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverCriteria {
	pub score_threshold: u8,
	pub min_turns: u32,
	pub max_elapsed_minutes: u32,
	pub escalation_phrases: Vec<String>,
	pub buying_signals: Vec<String>,
}
impl HandoverCriteria {
	pub fn from_config(cfg: &handover_config::Handover) -> Self {
		Self {
			score_threshold: cfg.score_threshold,
			min_turns: cfg.min_turns,
			max_elapsed_minutes: cfg.max_elapsed_minutes,
			escalation_phrases: cfg.escalation_phrases.clone(),
			buying_signals: cfg.buying_signals.clone(),
		}
	}

	pub fn with_override(mut self, overrides: &CriteriaOverride) -> Self {
		if let Some(score_threshold) = overrides.score_threshold {
			self.score_threshold = score_threshold;
		}
		if let Some(min_turns) = overrides.min_turns {
			self.min_turns = min_turns;
		}
		if let Some(max_elapsed_minutes) = overrides.max_elapsed_minutes {
			self.max_elapsed_minutes = max_elapsed_minutes;
		}
		if let Some(phrases) = &overrides.escalation_phrases {
			self.escalation_phrases = normalize_phrases(phrases);
		}
		if let Some(phrases) = &overrides.buying_signals {
			self.buying_signals = normalize_phrases(phrases);
		}

		self
	}

	pub fn matcher(&self) -> SignalMatcher {
		SignalMatcher::new(&self.escalation_phrases, &self.buying_signals)
	}
}

/// Per-campaign criteria stored as JSON. Absent fields fall back to the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriteriaOverride {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub score_threshold: Option<u8>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_turns: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_elapsed_minutes: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub escalation_phrases: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub buying_signals: Option<Vec<String>>,
}
impl CriteriaOverride {
	pub fn validate(&self) -> Result<(), CriteriaError> {
		if self.score_threshold.is_some_and(|score| score > 100) {
			return Err(CriteriaError { field: "score_threshold", message: "must be 0-100" });
		}
		if self.min_turns == Some(0) {
			return Err(CriteriaError { field: "min_turns", message: "must be greater than zero" });
		}
		if self.max_elapsed_minutes == Some(0) {
			return Err(CriteriaError {
				field: "max_elapsed_minutes",
				message: "must be greater than zero",
			});
		}

		for (field, phrases) in [
			("escalation_phrases", &self.escalation_phrases),
			("buying_signals", &self.buying_signals),
		] {
			let Some(phrases) = phrases else {
				continue;
			};

			if phrases.len() > MAX_PHRASES {
				return Err(CriteriaError { field, message: "has too many entries" });
			}
			if phrases.iter().any(|phrase| phrase.trim().is_empty()) {
				return Err(CriteriaError { field, message: "entries must be non-empty" });
			}
		}

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Criteria field {field} {message}.")]
pub struct CriteriaError {
	pub field: &'static str,
	pub message: &'static str,
}

pub struct EvaluationInput<'a> {
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub lead_name: Option<&'a str>,
	pub campaign_name: Option<&'a str>,
	pub transcript: &'a [TranscriptMessage],
	pub verdict: Option<&'a Verdict>,
	pub manual: bool,
	pub recommended_agent: Option<&'a str>,
	pub now: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverEvaluation {
	pub should_handover: bool,
	pub score: u8,
	pub triggered_criteria: Vec<String>,
	pub detected_intents: Vec<String>,
	pub urgency: Urgency,
	pub reason: Option<HandoverReason>,
	pub recommended_agent: Option<String>,
	pub sales_brief: Option<SalesBrief>,
	pub classifier_used: bool,
}

pub fn evaluate(criteria: &HandoverCriteria, input: &EvaluationInput<'_>) -> HandoverEvaluation {
	let matcher = criteria.matcher();
	let seen = matcher.detect_all(lead_turns(input.transcript).map(|turn| turn.content.as_str()));
	let score = match input.verdict {
		Some(verdict) => verdict.score,
		None => signals::heuristic_score(&seen),
	};
	let urgency = match input.verdict {
		Some(verdict) => verdict.urgency_level.max(signals::signal_urgency(&seen)),
		None => signals::signal_urgency(&seen),
	};
	let mut triggered_criteria: Vec<String> = Vec::new();
	let mut intent_hits = 0;

	if let Some(verdict) = input.verdict {
		for criterion in &verdict.triggered_criteria {
			push_unique(&mut triggered_criteria, criterion.clone());
		}

		intent_hits += verdict.triggered_criteria.len();
	}
	// Phrase hits stand in for classifier triggers only when no verdict is available.
	if input.verdict.is_none() {
		let latest: Vec<Signal> = lead_turns(input.transcript)
			.last()
			.map(|turn| matcher.detect(&turn.content))
			.unwrap_or_default();

		for signal in &latest {
			push_unique(&mut triggered_criteria, signal.criterion());

			intent_hits += 1;
		}
	}

	let rule_hits = rule_criteria(criteria, input.transcript, score);
	let reason = if intent_hits > 0 {
		Some(HandoverReason::IntentTrigger)
	} else if input.manual {
		Some(HandoverReason::Manual)
	} else if !rule_hits.is_empty() {
		Some(HandoverReason::RuleThreshold)
	} else {
		None
	};

	if input.manual {
		push_unique(&mut triggered_criteria, MANUAL_CRITERION.to_string());
	}
	for criterion in rule_hits {
		push_unique(&mut triggered_criteria, criterion);
	}

	let mut detected_intents: Vec<String> = Vec::new();

	if let Some(verdict) = input.verdict {
		for intent in &verdict.detected_intents {
			push_unique(&mut detected_intents, intent.clone());
		}
	}
	for signal in &seen {
		push_unique(&mut detected_intents, signal.intent());
	}

	let should_handover = reason.is_some();
	let sales_brief = reason.map(|reason| {
		brief::build_sales_brief(&BriefInput {
			lead_id: input.lead_id,
			campaign_id: input.campaign_id,
			lead_name: input.lead_name,
			campaign_name: input.campaign_name,
			reason,
			urgency,
			score,
			detected_intents: &detected_intents,
			signals: &seen,
			transcript: input.transcript,
			triggered_at: input.now,
		})
	});

	HandoverEvaluation {
		should_handover,
		score,
		triggered_criteria,
		detected_intents,
		urgency,
		reason,
		recommended_agent: if should_handover {
			input.recommended_agent.map(str::to_string)
		} else {
			None
		},
		sales_brief,
		classifier_used: input.verdict.is_some(),
	}
}

fn rule_criteria(
	criteria: &HandoverCriteria,
	transcript: &[TranscriptMessage],
	score: u8,
) -> Vec<String> {
	let mut hits = Vec::new();
	let turns = lead_turns(transcript).count();

	if score >= criteria.score_threshold {
		hits.push(format!("rule:score>={}", criteria.score_threshold));
	}
	if turns >= criteria.min_turns as usize {
		hits.push(format!("rule:turns>={}", criteria.min_turns));
	}
	if let (Some(first), Some(last)) = (transcript.first(), transcript.last()) {
		let elapsed = last.sent_at - first.sent_at;

		if elapsed.whole_minutes() >= i64::from(criteria.max_elapsed_minutes) {
			hits.push(format!("rule:elapsed_minutes>={}", criteria.max_elapsed_minutes));
		}
	}

	hits
}

fn normalize_phrases(phrases: &[String]) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(phrases.len());

	for phrase in phrases {
		push_unique(&mut out, phrase.trim().to_lowercase());
	}

	out
}

fn push_unique(out: &mut Vec<String>, value: String) {
	if !out.contains(&value) {
		out.push(value);
	}
}
