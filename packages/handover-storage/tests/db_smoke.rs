use time::OffsetDateTime;

use handover_config::Postgres;
use handover_storage::{Error, db::Db, models::NewMessage, queries};
use handover_testkit::TestDatabase;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set HANDOVER_PG_DSN to run."]
async fn db_connects_and_bootstraps_twice() {
	let Some(base_dsn) = handover_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps_twice; set HANDOVER_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	db.ensure_schema().await.expect("Schema bootstrap must be repeatable.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'notification_outbox'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set HANDOVER_PG_DSN to run."]
async fn one_conversation_per_pair_and_one_message_per_provider_id() {
	let Some(base_dsn) = handover_testkit::env_dsn() else {
		eprintln!("Skipping one_conversation_per_pair_and_one_message_per_provider_id; set HANDOVER_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let campaign =
		queries::insert_campaign(&db.pool, "Spring Event", "spring@dealer.test", Some("rep-7"))
			.await
			.expect("Failed to insert campaign.");

	assert!(matches!(
		queries::insert_campaign(&db.pool, "Copy", "spring@dealer.test", None).await,
		Err(Error::Conflict(_))
	));

	let lead = queries::upsert_lead(&db.pool, "jane@example.com", Some("Jane Doe"))
		.await
		.expect("Failed to insert lead.");
	let again = queries::upsert_lead(&db.pool, "jane@example.com", None)
		.await
		.expect("Failed to upsert lead.");

	assert_eq!(lead.lead_id, again.lead_id);
	assert_eq!(again.display_name.as_deref(), Some("Jane Doe"));

	let first = queries::upsert_conversation(&db.pool, lead.lead_id, campaign.campaign_id)
		.await
		.expect("Failed to create conversation.");
	let second = queries::upsert_conversation(&db.pool, lead.lead_id, campaign.campaign_id)
		.await
		.expect("Failed to resolve conversation.");

	assert_eq!(first.conversation_id, second.conversation_id);

	let message = NewMessage {
		conversation_id: first.conversation_id,
		role: "lead",
		content: "Is the blue one still available?",
		subject: Some("Re: Spring Event"),
		sent_at: OffsetDateTime::now_utc(),
		provider_message_id: Some("<msg-1@mail.test>"),
		delivery_status: "received",
	};

	assert!(
		queries::insert_message(&db.pool, &message)
			.await
			.expect("Failed to insert message.")
			.is_some()
	);
	assert!(
		queries::insert_message(&db.pool, &message)
			.await
			.expect("Replay must not error.")
			.is_none()
	);
	assert_eq!(
		queries::list_messages(&db.pool, first.conversation_id)
			.await
			.expect("Failed to list messages.")
			.len(),
		1
	);
	assert_eq!(
		queries::update_delivery_status(
			&db.pool,
			"<msg-1@mail.test>",
			"delivered",
			OffsetDateTime::now_utc()
		)
		.await
		.expect("Failed to update delivery status."),
		1
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
