//! HMAC-SHA256 signing and verification for inbound provider webhooks and outbound handover
//! notifications.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_FIELD: &str = "signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
	#[error("Signature is missing.")]
	Missing,
	#[error("Signature does not match.")]
	Mismatch,
	#[error("Signature is not valid {encoding}.")]
	Malformed { encoding: &'static str },
	#[error("Webhook timestamp is outside the accepted window.")]
	Stale,
}

/// Verifies a mail provider webhook signature: hex HMAC-SHA256 of `timestamp + token`.
///
/// Without a signing key every request is accepted. With a key, an absent or mismatching
/// signature is rejected. The comparison is constant time.
pub fn verify_inbound(
	signing_key: Option<&str>,
	timestamp: &str,
	token: &str,
	signature: Option<&str>,
) -> Result<(), SignatureError> {
	let Some(key) = signing_key else {
		return Ok(());
	};
	let signature = signature.map(str::trim).filter(|sig| !sig.is_empty());
	let Some(signature) = signature else {
		return Err(SignatureError::Missing);
	};
	let expected =
		hex::decode(signature).map_err(|_| SignatureError::Malformed { encoding: "hex" })?;
	let mut mac = new_mac(key);

	mac.update(timestamp.as_bytes());
	mac.update(token.as_bytes());
	mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Produces the hex signature a provider would send for `timestamp + token`.
pub fn sign_inbound(signing_key: &str, timestamp: &str, token: &str) -> String {
	let mut mac = new_mac(signing_key);

	mac.update(timestamp.as_bytes());
	mac.update(token.as_bytes());

	hex::encode(mac.finalize().into_bytes())
}

/// Rejects unix-second timestamps further than `max_skew_seconds` from `now`. A zero window
/// disables the check.
pub fn check_freshness(
	timestamp: &str,
	now: OffsetDateTime,
	max_skew_seconds: i64,
) -> Result<(), SignatureError> {
	if max_skew_seconds == 0 {
		return Ok(());
	}

	let seconds: i64 = timestamp.trim().parse().map_err(|_| SignatureError::Stale)?;
	let skew = now.unix_timestamp().abs_diff(seconds);

	if skew > max_skew_seconds.unsigned_abs() {
		return Err(SignatureError::Stale);
	}

	Ok(())
}

/// Base64 HMAC-SHA256 over the canonical form of `payload` with any `signature` field removed.
pub fn sign_payload(secret: &str, payload: &Value) -> String {
	let mut mac = new_mac(secret);

	mac.update(canonical_unsigned(payload).as_bytes());

	STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_payload(secret: &str, payload: &Value, signature: &str) -> Result<(), SignatureError> {
	let signature = signature.trim();

	if signature.is_empty() {
		return Err(SignatureError::Missing);
	}

	let expected =
		STANDARD.decode(signature).map_err(|_| SignatureError::Malformed { encoding: "base64" })?;
	let mut mac = new_mac(secret);

	mac.update(canonical_unsigned(payload).as_bytes());
	mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Returns a copy of `payload` with the signature attached. Non-object payloads are wrapped
/// under `payload`.
pub fn attach_signature(secret: &str, payload: &Value) -> Value {
	let signature = sign_payload(secret, payload);
	let mut signed = match payload {
		Value::Object(map) => map.clone(),
		other => {
			let mut map = serde_json::Map::new();

			map.insert("payload".to_string(), other.clone());

			return attach_signature(secret, &Value::Object(map));
		},
	};

	signed.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));

	Value::Object(signed)
}

/// Serializes JSON with object keys sorted at every depth and the top-level signature dropped.
pub fn canonical_unsigned(payload: &Value) -> String {
	let mut out = String::new();

	match payload {
		Value::Object(map) => {
			let mut keys: Vec<&String> =
				map.keys().filter(|key| key.as_str() != SIGNATURE_FIELD).collect();

			keys.sort();
			write_object(&mut out, map, &keys);
		},
		other => write_canonical(&mut out, other),
	}

	out
}

fn write_canonical(out: &mut String, value: &Value) {
	match value {
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();

			keys.sort();
			write_object(out, map, &keys);
		},
		Value::Array(items) => {
			out.push('[');

			for (idx, item) in items.iter().enumerate() {
				if idx > 0 {
					out.push(',');
				}

				write_canonical(out, item);
			}

			out.push(']');
		},
		scalar => out.push_str(&scalar.to_string()),
	}
}

fn write_object(out: &mut String, map: &serde_json::Map<String, Value>, keys: &[&String]) {
	out.push('{');

	for (idx, key) in keys.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}

		out.push_str(&Value::String((*key).clone()).to_string());
		out.push(':');

		if let Some(value) = map.get(key.as_str()) {
			write_canonical(out, value);
		}
	}

	out.push('}');
}

fn new_mac(key: &str) -> HmacSha256 {
	match HmacSha256::new_from_slice(key.as_bytes()) {
		Ok(mac) => mac,
		Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length."),
	}
}
