use regex::Regex;

use crate::verdict::Urgency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
	Escalation,
	BuyingSignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal {
	pub kind: SignalKind,
	pub phrase: String,
}
impl Signal {
	/// Label recorded in an evaluation's triggered criteria.
	pub fn criterion(&self) -> String {
		match self.kind {
			SignalKind::Escalation => format!("escalation:{}", self.phrase),
			SignalKind::BuyingSignal => format!("buying_signal:{}", self.phrase),
		}
	}

	pub fn intent(&self) -> String {
		match self.kind {
			SignalKind::Escalation => "human_contact_request".to_string(),
			SignalKind::BuyingSignal => intent_for_phrase(&self.phrase),
		}
	}
}

/// Case-insensitive, word-bounded phrase matcher for escalation phrases and buying signals.
pub struct SignalMatcher {
	patterns: Vec<(Signal, Regex)>,
}
impl SignalMatcher {
	pub fn new(escalation_phrases: &[String], buying_signals: &[String]) -> Self {
		let escalation = escalation_phrases.iter().map(|phrase| (SignalKind::Escalation, phrase));
		let buying = buying_signals.iter().map(|phrase| (SignalKind::BuyingSignal, phrase));
		let patterns = escalation
			.chain(buying)
			.filter_map(|(kind, phrase)| {
				let phrase = phrase.trim().to_lowercase();
				let regex = phrase_regex(&phrase)?;

				Some((Signal { kind, phrase }, regex))
			})
			.collect();

		Self { patterns }
	}

	/// Signals found in `text`, in configuration order, escalations first.
	pub fn detect(&self, text: &str) -> Vec<Signal> {
		self.patterns
			.iter()
			.filter(|(_, regex)| regex.is_match(text))
			.map(|(signal, _)| signal.clone())
			.collect()
	}

	/// Distinct signals across several texts, keeping first-seen order.
	pub fn detect_all<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Vec<Signal> {
		let mut out: Vec<Signal> = Vec::new();

		for text in texts {
			for signal in self.detect(text) {
				if !out.contains(&signal) {
					out.push(signal);
				}
			}
		}

		out
	}
}

/// Urgency implied by signals alone.
pub fn signal_urgency(signals: &[Signal]) -> Urgency {
	if signals.iter().any(|signal| signal.kind == SignalKind::Escalation) {
		Urgency::High
	} else if signals.is_empty() {
		Urgency::Low
	} else {
		Urgency::Medium
	}
}

/// Qualification score used when no classifier verdict is available.
pub fn heuristic_score(signals: &[Signal]) -> u8 {
	let buying =
		signals.iter().filter(|signal| signal.kind == SignalKind::BuyingSignal).count() as u32;
	let escalation = signals.iter().any(|signal| signal.kind == SignalKind::Escalation);
	let score = buying.saturating_mul(25) + if escalation { 40 } else { 0 };

	score.min(100) as u8
}

pub fn intent_for_phrase(phrase: &str) -> String {
	let phrase = phrase.to_lowercase();

	if phrase.contains("test drive") {
		return "test_drive".to_string();
	}
	if phrase.contains("trade") {
		return "trade_in".to_string();
	}
	if ["financ", "payment", "lease", "credit", "apr"].iter().any(|key| phrase.contains(key)) {
		return "financing".to_string();
	}
	if ["price", "out the door", "quote", "deal"].iter().any(|key| phrase.contains(key)) {
		return "pricing".to_string();
	}
	if ["appointment", "come in", "visit", "schedule"].iter().any(|key| phrase.contains(key)) {
		return "appointment".to_string();
	}
	if phrase.contains("buy") || phrase.contains("purchase") {
		return "purchase_intent".to_string();
	}

	phrase
		.split(|ch: char| !ch.is_ascii_alphanumeric())
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join("_")
}

fn phrase_regex(phrase: &str) -> Option<Regex> {
	let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();

	if words.is_empty() {
		return None;
	}

	Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+"))).ok()
}
