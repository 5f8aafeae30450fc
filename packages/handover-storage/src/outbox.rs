//! Handover notification outbox.
//!
//! Rows move `PENDING → CLAIMED → {DONE | FAILED}`. A claim is a lease: a `CLAIMED` row whose
//! lease expired is claimable again. `FAILED` rows stay put until an operator re-queues them.

use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, db::Db, models::NotificationOutboxEntry};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_CLAIMED: &str = "CLAIMED";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_FAILED: &str = "FAILED";

const ENTRY_COLUMNS: &str = "\
outbox_id,
\tevaluation_id,
\tconversation_id,
\tpayload,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at";

pub async fn enqueue_notification<'e, E>(
	executor: E,
	evaluation_id: Uuid,
	conversation_id: Uuid,
	payload: &Value,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let outbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO notification_outbox (
\toutbox_id,
\tevaluation_id,
\tconversation_id,
\tpayload,
\tstatus,
\tavailable_at,
\tcreated_at,
\tupdated_at
)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)",
	)
	.bind(outbox_id)
	.bind(evaluation_id)
	.bind(conversation_id)
	.bind(payload)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(outbox_id)
}

pub async fn claim_next_notification(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<NotificationOutboxEntry>> {
	if lease_seconds <= 0 {
		return Err(Error::InvalidArgument(format!(
			"Claim lease must be positive, got {lease_seconds} seconds."
		)));
	}

	let mut tx = db.pool.begin().await?;
	let sql = format!(
		"\
SELECT
\t{ENTRY_COLUMNS}
FROM notification_outbox
WHERE status IN ('PENDING', 'CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
	);
	let row = sqlx::query_as::<_, NotificationOutboxEntry>(&sql)
		.bind(now)
		.fetch_optional(&mut *tx)
		.await?;
	let entry = if let Some(mut entry) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE notification_outbox SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(entry.outbox_id)
		.execute(&mut *tx)
		.await?;

		entry.status = STATUS_CLAIMED.to_string();
		entry.available_at = lease_until;
		entry.updated_at = now;

		Some(entry)
	} else {
		None
	};

	tx.commit().await?;

	Ok(entry)
}

pub async fn mark_notification_done(
	db: &Db,
	outbox_id: Uuid,
	attempts: &Value,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE notification_outbox
SET status = 'DONE',
\tattempts = $1,
\tlast_error = NULL,
\tupdated_at = $2
WHERE outbox_id = $3",
	)
	.bind(attempts)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_notification_failed(
	db: &Db,
	outbox_id: Uuid,
	attempts: &Value,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE notification_outbox
SET status = 'FAILED',
\tattempts = $1,
\tlast_error = $2,
\tupdated_at = $3
WHERE outbox_id = $4",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Moves a `FAILED` row back to `PENDING`. Returns `false` if the row is missing or not failed.
pub async fn requeue_failed_notification(
	db: &Db,
	outbox_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE notification_outbox
SET status = 'PENDING',
\tavailable_at = $1,
\tupdated_at = $1
WHERE outbox_id = $2 AND status = 'FAILED'",
	)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn get_notification(
	db: &Db,
	outbox_id: Uuid,
) -> Result<Option<NotificationOutboxEntry>> {
	let sql = format!("SELECT {ENTRY_COLUMNS} FROM notification_outbox WHERE outbox_id = $1");
	let entry = sqlx::query_as::<_, NotificationOutboxEntry>(&sql)
		.bind(outbox_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(entry)
}

pub async fn list_failed_notifications(
	db: &Db,
	limit: i64,
) -> Result<Vec<NotificationOutboxEntry>> {
	let sql = format!(
		"\
SELECT
\t{ENTRY_COLUMNS}
FROM notification_outbox
WHERE status = 'FAILED'
ORDER BY updated_at DESC
LIMIT $1"
	);
	let entries =
		sqlx::query_as::<_, NotificationOutboxEntry>(&sql).bind(limit).fetch_all(&db.pool).await?;

	Ok(entries)
}
