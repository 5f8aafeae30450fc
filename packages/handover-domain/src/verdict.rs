//! Schema for the classifier's structured verdict.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_TRIGGERED_CRITERIA: usize = 16;
pub const MAX_DETECTED_INTENTS: usize = 16;
pub const MAX_LABEL_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
	Low,
	Medium,
	High,
}
impl Urgency {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Low => "low",
			Self::Medium => "medium",
			Self::High => "high",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
	pub score: u8,
	pub triggered_criteria: Vec<String>,
	pub urgency_level: Urgency,
	pub detected_intents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerdictError {
	#[error("Verdict does not match the schema: {message}")]
	Schema { message: String },
	#[error("Verdict field {field} is invalid: {message}")]
	InvalidField { field: &'static str, message: String },
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
	score: f64,
	#[serde(default, rename = "triggeredCriteria", alias = "triggered_criteria")]
	triggered_criteria: Option<Vec<String>>,
	#[serde(rename = "urgencyLevel", alias = "urgency_level", alias = "urgency")]
	urgency_level: String,
	#[serde(default, rename = "detectedIntents", alias = "detected_intents")]
	detected_intents: Option<Vec<String>>,
}

/// Validates classifier JSON. `score` and `urgencyLevel` are required; list fields default to
/// empty and are bounded in length.
pub fn parse_verdict(value: &Value) -> Result<Verdict, VerdictError> {
	if !value.is_object() {
		return Err(VerdictError::Schema { message: "expected a JSON object".to_string() });
	}

	let raw: RawVerdict = serde_json::from_value(value.clone())
		.map_err(|err| VerdictError::Schema { message: err.to_string() })?;

	if !raw.score.is_finite() || !(0.0..=100.0).contains(&raw.score) {
		return Err(VerdictError::InvalidField {
			field: "score",
			message: format!("{} is outside 0-100", raw.score),
		});
	}
	if raw.score.fract() != 0.0 {
		return Err(VerdictError::InvalidField {
			field: "score",
			message: format!("{} is not an integer", raw.score),
		});
	}

	let urgency_level = match raw.urgency_level.trim().to_ascii_lowercase().as_str() {
		"low" => Urgency::Low,
		"medium" => Urgency::Medium,
		"high" => Urgency::High,
		other => {
			return Err(VerdictError::InvalidField {
				field: "urgencyLevel",
				message: format!("{other:?} is not one of low, medium, or high"),
			});
		},
	};
	let triggered_criteria = clean_labels(
		raw.triggered_criteria.unwrap_or_default(),
		"triggeredCriteria",
		MAX_TRIGGERED_CRITERIA,
	)?;
	let detected_intents = clean_labels(
		raw.detected_intents.unwrap_or_default(),
		"detectedIntents",
		MAX_DETECTED_INTENTS,
	)?;

	Ok(Verdict {
		score: raw.score as u8,
		triggered_criteria,
		urgency_level,
		detected_intents,
	})
}

fn clean_labels(
	labels: Vec<String>,
	field: &'static str,
	max: usize,
) -> Result<Vec<String>, VerdictError> {
	if labels.len() > max {
		return Err(VerdictError::InvalidField {
			field,
			message: format!("has {} entries; at most {max} are allowed", labels.len()),
		});
	}

	let mut out: Vec<String> = Vec::with_capacity(labels.len());

	for label in labels {
		let label = label.trim();

		if label.is_empty() {
			return Err(VerdictError::InvalidField {
				field,
				message: "entries must be non-empty".to_string(),
			});
		}
		if label.chars().count() > MAX_LABEL_CHARS {
			return Err(VerdictError::InvalidField {
				field,
				message: format!("entries must be at most {MAX_LABEL_CHARS} characters"),
			});
		}
		if !out.iter().any(|existing| existing == label) {
			out.push(label.to_string());
		}
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_camel_case_verdict() {
		let verdict = parse_verdict(&serde_json::json!({
			"score": 86,
			"triggeredCriteria": ["asked for test drive", "asked for test drive"],
			"urgencyLevel": "High",
			"detectedIntents": ["test_drive"],
		}))
		.expect("Verdict should parse.");

		assert_eq!(verdict.score, 86);
		assert_eq!(verdict.triggered_criteria, vec!["asked for test drive".to_string()]);
		assert_eq!(verdict.urgency_level, Urgency::High);
	}

	#[test]
	fn rejects_fractional_score() {
		let err = parse_verdict(&serde_json::json!({ "score": 86.4, "urgencyLevel": "high" }))
			.expect_err("Fractional score should be rejected.");

		assert!(matches!(err, VerdictError::InvalidField { field: "score", .. }));

		let verdict = parse_verdict(&serde_json::json!({ "score": 86.0, "urgencyLevel": "high" }))
			.expect("Integral float score should parse.");

		assert_eq!(verdict.score, 86);
	}

	#[test]
	fn accepts_snake_case_and_missing_lists() {
		let verdict = parse_verdict(&serde_json::json!({ "score": 10, "urgency_level": "low" }))
			.expect("Verdict should parse.");

		assert!(verdict.triggered_criteria.is_empty());
		assert!(verdict.detected_intents.is_empty());
	}

	#[test]
	fn rejects_out_of_range_score() {
		let err = parse_verdict(&serde_json::json!({ "score": 120, "urgencyLevel": "low" }))
			.expect_err("Score above 100 must fail.");

		assert!(matches!(err, VerdictError::InvalidField { field: "score", .. }));
	}

	#[test]
	fn rejects_missing_required_fields_and_unknown_urgency() {
		assert!(matches!(
			parse_verdict(&serde_json::json!({ "urgencyLevel": "low" })),
			Err(VerdictError::Schema { .. })
		));
		assert!(matches!(
			parse_verdict(&serde_json::json!({ "score": 5, "urgencyLevel": "urgent" })),
			Err(VerdictError::InvalidField { field: "urgencyLevel", .. })
		));
		assert!(matches!(
			parse_verdict(&serde_json::json!(["score", 5])),
			Err(VerdictError::Schema { .. })
		));
	}

	#[test]
	fn rejects_unbounded_lists() {
		let criteria: Vec<String> = (0..=MAX_TRIGGERED_CRITERIA).map(|i| format!("c{i}")).collect();
		let err = parse_verdict(&serde_json::json!({
			"score": 50,
			"urgencyLevel": "medium",
			"triggeredCriteria": criteria,
		}))
		.expect_err("Too many criteria must fail.");

		assert!(matches!(err, VerdictError::InvalidField { field: "triggeredCriteria", .. }));
	}
}
