use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use handover_config::Postgres;
use handover_storage::{
	db::Db,
	models::HandoverEvaluation,
	outbox::{self, STATUS_CLAIMED, STATUS_FAILED},
	queries,
};

#[tokio::test]
#[ignore = "Requires external Postgres. Set HANDOVER_PG_DSN to run."]
async fn claims_fail_and_requeue_notifications() {
	let Some(base_dsn) = handover_testkit::env_dsn() else {
		eprintln!("Skipping claims_fail_and_requeue_notifications; set HANDOVER_PG_DSN to run.");

		return;
	};
	let test_db = handover_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let campaign = queries::insert_campaign(&db.pool, "Spring", "spring@dealer.test", None)
		.await
		.expect("Failed to insert campaign.");
	let lead =
		queries::upsert_lead(&db.pool, "sam@example.com", None).await.expect("Failed to insert lead.");
	let conversation = queries::upsert_conversation(&db.pool, lead.lead_id, campaign.campaign_id)
		.await
		.expect("Failed to create conversation.");
	let now = OffsetDateTime::now_utc();
	let evaluation = HandoverEvaluation {
		evaluation_id: Uuid::new_v4(),
		conversation_id: conversation.conversation_id,
		message_id: None,
		should_handover: true,
		score: 90,
		triggered_criteria: json!(["escalation:call me"]),
		detected_intents: json!(["human_contact_request"]),
		urgency: "high".to_string(),
		reason: Some("intent_trigger".to_string()),
		recommended_agent: None,
		sales_brief: None,
		classifier_used: false,
		created_at: now,
	};
	let mut tx = db.pool.begin().await.expect("Failed to begin transaction.");

	queries::insert_evaluation(&mut *tx, &evaluation).await.expect("Failed to insert evaluation.");

	let outbox_id = outbox::enqueue_notification(
		&mut *tx,
		evaluation.evaluation_id,
		conversation.conversation_id,
		&json!({ "hello": "world" }),
		now,
	)
	.await
	.expect("Failed to enqueue notification.");

	tx.commit().await.expect("Failed to commit.");

	assert!(outbox::claim_next_notification(&db, now, 0).await.is_err());

	let claimed = outbox::claim_next_notification(&db, now, 60)
		.await
		.expect("Failed to claim.")
		.expect("A pending row should be claimable.");

	assert_eq!(claimed.outbox_id, outbox_id);
	assert_eq!(claimed.status, STATUS_CLAIMED);
	assert!(
		outbox::claim_next_notification(&db, now, 60).await.expect("Failed to claim.").is_none(),
		"A leased row must not be claimed twice."
	);

	outbox::mark_notification_failed(&db, outbox_id, &json!([500, 500, 500]), "HTTP 500", now)
		.await
		.expect("Failed to mark failed.");

	assert!(
		outbox::claim_next_notification(&db, now + Duration::hours(1), 60)
			.await
			.expect("Failed to claim.")
			.is_none(),
		"Failed rows are not re-queued automatically."
	);

	let failed = outbox::list_failed_notifications(&db, 10).await.expect("Failed to list.");

	assert_eq!(failed.len(), 1);
	assert_eq!(failed[0].status, STATUS_FAILED);
	assert_eq!(failed[0].attempts, json!([500, 500, 500]));
	assert!(outbox::requeue_failed_notification(&db, outbox_id, now).await.expect("Requeue."));
	assert!(!outbox::requeue_failed_notification(&db, outbox_id, now).await.expect("Requeue."));
	assert!(outbox::claim_next_notification(&db, now, 60).await.expect("Claim.").is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
