use axum::{
	Form, Json, Router,
	extract::{
		Path, Query, State,
		rejection::{FormRejection, JsonRejection},
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use handover_domain::decision::CriteriaOverride;
use handover_service::{
	CriteriaView, DeliveryEvent, DeliveryEventOutcome, Error as ServiceError, InboundEmail,
	IngestOutcome, ManualHandoverRequest, OutboundMessage, store::OutboxRecord,
};

const DEFAULT_FAILED_LIMIT: i64 = 50;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/inbound/email", post(inbound_email))
		.route("/v1/events/delivery", post(delivery_event))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/conversations/outbound", post(outbound_message))
		.route("/v1/conversations/{conversation_id}/handover", post(manual_handover))
		.route(
			"/v1/campaigns/{campaign_id}/handover-criteria",
			get(get_handover_criteria).put(put_handover_criteria),
		)
		.route("/v1/admin/notifications/failed", get(failed_notifications))
		.route("/v1/admin/notifications/{outbox_id}/retry", post(retry_notification))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn inbound_email(
	State(state): State<AppState>,
	payload: Result<Form<InboundEmail>, FormRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
	let Form(payload) = payload?;

	match state.service.ingest_inbound(payload).await {
		Ok(outcome) => Ok(Json(outcome)),
		// 406 tells the mail provider to stop retrying.
		Err(ServiceError::NotFound { message }) =>
			Err(json_error(StatusCode::NOT_ACCEPTABLE, "UNKNOWN_RECIPIENT", message, None)),
		Err(err) => Err(err.into()),
	}
}

async fn delivery_event(
	State(state): State<AppState>,
	payload: Result<Json<DeliveryEvent>, JsonRejection>,
) -> Result<Json<DeliveryEventOutcome>, ApiError> {
	let Json(payload) = payload?;

	match state.service.apply_delivery_event(payload).await {
		Ok(response) => Ok(Json(response)),
		Err(ServiceError::NotFound { message }) =>
			Err(json_error(StatusCode::NOT_ACCEPTABLE, "UNKNOWN_MESSAGE", message, None)),
		Err(err) => Err(err.into()),
	}
}

async fn outbound_message(
	State(state): State<AppState>,
	payload: Result<Json<OutboundMessage>, JsonRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.record_outbound(payload).await?;

	Ok(Json(response))
}

async fn manual_handover(
	State(state): State<AppState>,
	Path(conversation_id): Path<Uuid>,
	payload: Result<Json<ManualHandoverRequest>, JsonRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.manual_handover(conversation_id, payload).await?;

	Ok(Json(response))
}

async fn get_handover_criteria(
	State(state): State<AppState>,
	Path(campaign_id): Path<Uuid>,
) -> Result<Json<CriteriaView>, ApiError> {
	let response = state.service.handover_criteria(campaign_id).await?;

	Ok(Json(response))
}

async fn put_handover_criteria(
	State(state): State<AppState>,
	Path(campaign_id): Path<Uuid>,
	payload: Result<Json<CriteriaOverride>, JsonRejection>,
) -> Result<Json<CriteriaView>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.update_handover_criteria(campaign_id, payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct FailedQuery {
	limit: Option<i64>,
}

async fn failed_notifications(
	State(state): State<AppState>,
	Query(query): Query<FailedQuery>,
) -> Result<Json<Vec<OutboxRecord>>, ApiError> {
	let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT);
	let response = state.service.list_failed_notifications(limit).await?;

	Ok(Json(response))
}

async fn retry_notification(
	State(state): State<AppState>,
	Path(outbox_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	state.service.retrigger_notification(outbox_id).await?;

	Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::Authentication { message } =>
				json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, None),
			ServiceError::DuplicateMessage { provider_message_id } => json_error(
				StatusCode::CONFLICT,
				"DUPLICATE_MESSAGE",
				format!("Message {provider_message_id} was already received."),
				None,
			),
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::InvalidField { field, message } => json_error(
				StatusCode::UNPROCESSABLE_ENTITY,
				"INVALID_FIELD",
				format!("{field} {message}."),
				Some(vec![format!("$.{field}")]),
			),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "CONFLICT", message, None),
			ServiceError::Provider { message } => {
				tracing::error!(error = %message, "Provider call failed.");

				json_error(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage operation failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"STORAGE_ERROR",
					"Storage operation failed.",
					None,
				)
			},
		}
	}
}

impl From<FormRejection> for ApiError {
	fn from(err: FormRejection) -> Self {
		json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", err.body_text(), None)
	}
}

impl From<JsonRejection> for ApiError {
	fn from(err: JsonRejection) -> Self {
		json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", err.body_text(), None)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
