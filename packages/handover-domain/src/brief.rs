use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	conversation::{SenderRole, TranscriptMessage, lead_turns},
	decision::HandoverReason,
	signals::{Signal, SignalKind},
	verdict::Urgency,
};

pub const MAX_QUICK_INSIGHTS: usize = 4;
pub const MAX_ACTIONS: usize = 6;
pub const MAX_RESEARCH_QUERIES: usize = 4;

const EXCERPT_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
	Standard,
	Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesBrief {
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub reason: HandoverReason,
	pub detected_intents: Vec<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub triggered_at: OffsetDateTime,
	pub transcript: Vec<TranscriptMessage>,
	pub quick_insights: Vec<String>,
	pub actions: Vec<String>,
	pub sales_readiness: Urgency,
	pub priority: Priority,
	pub rep_message: String,
	pub research_queries: Vec<String>,
	pub reply_required: bool,
}

pub struct BriefInput<'a> {
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub lead_name: Option<&'a str>,
	pub campaign_name: Option<&'a str>,
	pub reason: HandoverReason,
	pub urgency: Urgency,
	pub score: u8,
	pub detected_intents: &'a [String],
	pub signals: &'a [Signal],
	pub transcript: &'a [TranscriptMessage],
	pub triggered_at: OffsetDateTime,
}

pub fn build_sales_brief(input: &BriefInput<'_>) -> SalesBrief {
	let priority = if input.urgency == Urgency::High { Priority::Immediate } else { Priority::Standard };

	SalesBrief {
		lead_id: input.lead_id,
		campaign_id: input.campaign_id,
		reason: input.reason,
		detected_intents: input.detected_intents.to_vec(),
		triggered_at: input.triggered_at,
		transcript: input.transcript.to_vec(),
		quick_insights: quick_insights(input),
		actions: actions(input, priority),
		sales_readiness: input.urgency,
		priority,
		rep_message: rep_message(input),
		research_queries: research_queries(input),
		reply_required: input
			.transcript
			.last()
			.map(|message| message.role == SenderRole::Lead)
			.unwrap_or(false),
	}
}

fn quick_insights(input: &BriefInput<'_>) -> Vec<String> {
	let mut insights = Vec::with_capacity(MAX_QUICK_INSIGHTS);
	let turns = lead_turns(input.transcript).count();
	let minutes = match (input.transcript.first(), input.transcript.last()) {
		(Some(first), Some(last)) => (last.sent_at - first.sent_at).whole_minutes().max(0),
		_ => 0,
	};

	if input.signals.iter().any(|signal| signal.kind == SignalKind::Escalation) {
		insights.push("Lead asked to speak with a person.".to_string());
	}

	let buying: Vec<&str> = input
		.signals
		.iter()
		.filter(|signal| signal.kind == SignalKind::BuyingSignal)
		.map(|signal| signal.phrase.as_str())
		.collect();

	if !buying.is_empty() {
		insights.push(format!("Buying signals: {}.", buying.join(", ")));
	}

	insights.push(format!(
		"Qualification score {}/100 with {} urgency.",
		input.score,
		input.urgency.as_str()
	));
	insights.push(format!("{turns} lead message(s) over {minutes} minute(s)."));

	if let Some(latest) = lead_turns(input.transcript).last() {
		insights.push(format!("Latest from lead: \"{}\"", excerpt(&latest.content)));
	}

	insights.truncate(MAX_QUICK_INSIGHTS);

	insights
}

fn actions(input: &BriefInput<'_>, priority: Priority) -> Vec<String> {
	let mut actions = Vec::with_capacity(MAX_ACTIONS);

	match priority {
		Priority::Immediate => actions.push("Call the lead now.".to_string()),
		Priority::Standard => actions.push("Reply to the lead within one business hour.".to_string()),
	}

	for intent in input.detected_intents {
		let action = match intent.as_str() {
			"test_drive" => "Offer two test drive time slots.",
			"financing" => "Prepare financing and lease options.",
			"trade_in" => "Request trade-in details and prepare an appraisal.",
			"pricing" => "Prepare an out-the-door price quote.",
			"appointment" => "Confirm an appointment time.",
			"human_contact_request" => "Introduce yourself as the lead's point of contact.",
			_ => continue,
		};

		if !actions.iter().any(|existing| existing == action) {
			actions.push(action.to_string());
		}
	}

	actions.push("Review the full transcript before reaching out.".to_string());
	actions.push("Log the outcome in the CRM.".to_string());
	actions.truncate(MAX_ACTIONS);

	actions
}

fn rep_message(input: &BriefInput<'_>) -> String {
	let greeting = match input.lead_name {
		Some(name) => format!("Hi {},", first_word(name)),
		None => "Hi there,".to_string(),
	};
	let topic = input
		.detected_intents
		.iter()
		.find_map(|intent| match intent.as_str() {
			"test_drive" => Some("setting up a test drive"),
			"financing" => Some("your financing options"),
			"trade_in" => Some("your trade-in"),
			"pricing" => Some("pricing"),
			"appointment" => Some("a time to come in"),
			_ => None,
		})
		.unwrap_or("your questions");
	let campaign = input.campaign_name.map(|name| format!(" about {name}")).unwrap_or_default();

	format!(
		"{greeting} thanks for reaching out{campaign}. I'm taking over from here and would be glad \
to help with {topic}. What time works best for a quick call today?"
	)
}

fn research_queries(input: &BriefInput<'_>) -> Vec<String> {
	let subject = input.campaign_name.unwrap_or("current inventory");
	let mut queries: Vec<String> = Vec::new();

	for intent in input.detected_intents {
		let query = match intent.as_str() {
			"financing" => format!("Current financing rates and lease specials for {subject}"),
			"trade_in" => "Trade-in market values for the lead's current vehicle".to_string(),
			"pricing" => format!("Competitive pricing and incentives for {subject}"),
			"test_drive" => format!("Test drive availability for {subject}"),
			_ => continue,
		};

		if !queries.contains(&query) {
			queries.push(query);
		}
	}

	if queries.is_empty() {
		queries.push(format!("Availability and incentives for {subject}"));
	}

	queries.truncate(MAX_RESEARCH_QUERIES);

	queries
}

fn excerpt(text: &str) -> String {
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

	if collapsed.chars().count() <= EXCERPT_CHARS {
		return collapsed;
	}

	let mut out: String = collapsed.chars().take(EXCERPT_CHARS).collect();

	out.push_str("...");

	out
}

fn first_word(name: &str) -> &str {
	name.split_whitespace().next().unwrap_or(name)
}
