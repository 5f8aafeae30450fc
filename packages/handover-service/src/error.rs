use handover_domain::{conversation::TransitionError, signature::SignatureError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Authentication failed: {message}")]
	Authentication { message: String },
	#[error("Duplicate message: {provider_message_id}")]
	DuplicateMessage { provider_message_id: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid field {field}: {message}")]
	InvalidField { field: String, message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<handover_storage::Error> for Error {
	fn from(err: handover_storage::Error) -> Self {
		match err {
			handover_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			handover_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			handover_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}
impl From<handover_providers::Error> for Error {
	fn from(err: handover_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<SignatureError> for Error {
	fn from(err: SignatureError) -> Self {
		Self::Authentication { message: err.to_string() }
	}
}
impl From<TransitionError> for Error {
	fn from(err: TransitionError) -> Self {
		Self::Conflict { message: err.to_string() }
	}
}
