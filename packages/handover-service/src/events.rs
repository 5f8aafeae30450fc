use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, HandoverService, Result, correlate};

/// Mail provider delivery event, JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryEvent {
	pub signature: EventSignature,
	#[serde(rename = "event-data")]
	pub event_data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSignature {
	pub timestamp: String,
	pub token: String,
	#[serde(default)]
	pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
	pub event: String,
	#[serde(default)]
	pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
	#[serde(default)]
	pub headers: EventHeaders,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventHeaders {
	#[serde(rename = "message-id", default)]
	pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryEventOutcome {
	pub provider_message_id: String,
	pub delivery_status: String,
	pub updated: u64,
}

impl HandoverService {
	pub async fn apply_delivery_event(&self, event: DeliveryEvent) -> Result<DeliveryEventOutcome> {
		self.authenticate(
			&event.signature.timestamp,
			&event.signature.token,
			event.signature.signature.as_deref(),
			OffsetDateTime::now_utc(),
		)?;

		let delivery_status = delivery_status_for(&event.event_data.event).ok_or_else(|| {
			Error::InvalidRequest {
				message: format!("Unsupported delivery event {}.", event.event_data.event),
			}
		})?;
		let provider_message_id = event
			.event_data
			.message
			.as_ref()
			.and_then(|message| message.headers.message_id.as_deref())
			.and_then(correlate::normalize_message_id)
			.ok_or_else(|| Error::InvalidRequest {
				message: "event-data.message.headers.message-id is required.".to_string(),
			})?;
		let updated =
			self.store.update_delivery_status(&provider_message_id, delivery_status).await?;

		if updated == 0 {
			return Err(Error::NotFound { message: format!("Message {provider_message_id}.") });
		}

		tracing::debug!(%provider_message_id, delivery_status, "Delivery status updated.");

		Ok(DeliveryEventOutcome {
			provider_message_id,
			delivery_status: delivery_status.to_string(),
			updated,
		})
	}
}

fn delivery_status_for(event: &str) -> Option<&'static str> {
	let status = match event.trim().to_ascii_lowercase().as_str() {
		"accepted" => "accepted",
		"delivered" => "delivered",
		"failed" | "rejected" | "bounced" => "failed",
		"opened" => "opened",
		"clicked" => "clicked",
		"complained" => "complained",
		"unsubscribed" => "unsubscribed",
		_ => return None,
	};

	Some(status)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_provider_events_to_statuses() {
		assert_eq!(delivery_status_for("Delivered"), Some("delivered"));
		assert_eq!(delivery_status_for("bounced"), Some("failed"));
		assert_eq!(delivery_status_for("stored"), None);
	}

	#[test]
	fn parses_provider_event_shape() {
		let raw = serde_json::json!({
			"signature": { "timestamp": "1700000000", "token": "tok", "signature": "ab" },
			"event-data": {
				"event": "delivered",
				"message": { "headers": { "message-id": "abc@mail.test" } }
			}
		});
		let event: DeliveryEvent = serde_json::from_value(raw).expect("Event should parse.");

		assert_eq!(event.event_data.event, "delivered");
		assert_eq!(
			event.event_data.message.and_then(|message| message.headers.message_id).as_deref(),
			Some("abc@mail.test")
		);
	}
}
