use std::sync::Arc;

use serde_json::{Map, Value};

use handover_config::{
	Config, Handover, Inbound, LlmProviderConfig, Notification, Postgres,
	Providers as ProviderSettings, Service, Storage, Worker,
};
use handover_domain::{decision::HandoverReason, retry::DeliveryReport, verdict::Verdict};
use handover_service::{
	BoxFuture, ClassifierProvider, HandoverService, InboundEmail, IngestStatus,
	NotificationDispatcher, Providers, store::PgStore,
};
use handover_storage::{
	db::Db,
	outbox::{self, STATUS_DONE},
	queries,
};

struct OfflineClassifier;
impl ClassifierProvider for OfflineClassifier {
	fn classify<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [handover_providers::classifier::ChatMessage],
	) -> BoxFuture<'a, handover_providers::Result<Verdict>> {
		Box::pin(async move {
			Err(handover_providers::Error::Classification {
				status: None,
				message: "offline".to_string(),
			})
		})
	}
}

struct AcceptingDispatcher;
impl NotificationDispatcher for AcceptingDispatcher {
	fn deliver<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, DeliveryReport> {
		Box::pin(async move { DeliveryReport { delivered: true, error: None, attempts: vec![204] } })
	}
}

fn test_config(dsn: String) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage { postgres: Postgres { dsn, pool_max_conns: 2 } },
		providers: ProviderSettings {
			llm_classifier: LlmProviderConfig {
				provider_id: "offline".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "test-model".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		inbound: Inbound { signing_key: None, max_timestamp_skew_seconds: 900 },
		handover: Handover::default(),
		notification: Notification {
			url: "http://127.0.0.1:1/hook".to_string(),
			secret: None,
			timeout_ms: 1_000,
			max_attempts: 1,
			base_backoff_ms: 10,
		},
		worker: Worker::default(),
	}
}

fn email(body: &str, message_id: &str) -> InboundEmail {
	InboundEmail {
		sender: "Sam Lee <sam@example.com>".to_string(),
		recipient: "spring@dealer.test".to_string(),
		subject: None,
		body: body.to_string(),
		timestamp: "1700000000".to_string(),
		token: "token".to_string(),
		signature: None,
		message_id: Some(message_id.to_string()),
		from: None,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set HANDOVER_PG_DSN to run."]
async fn postgres_pipeline_hands_over_once() {
	let Some(base_dsn) = handover_testkit::env_dsn() else {
		eprintln!("Skipping postgres_pipeline_hands_over_once; set HANDOVER_PG_DSN to run.");

		return;
	};
	let test_db = handover_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = test_config(test_db.dsn().to_string());
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");
	queries::insert_campaign(&db.pool, "Spring", "spring@dealer.test", Some("Dana"))
		.await
		.expect("Failed to insert campaign.");

	let service = HandoverService::new(
		cfg,
		Arc::new(PgStore::new(Db::from_pool(db.pool.clone()))),
		Providers::new(Arc::new(OfflineClassifier), Arc::new(AcceptingDispatcher)),
	);
	let first = service
		.ingest_inbound(email("I want to speak to a human about a test drive.", "<p1@mail.test>"))
		.await
		.expect("Ingest should succeed.");
	let replay = service
		.ingest_inbound(email("I want to speak to a human about a test drive.", "p1@mail.test"))
		.await
		.expect("Replay should succeed.");
	let later = service
		.ingest_inbound(email("Are you there?", "p2@mail.test"))
		.await
		.expect("Ingest should succeed.");

	assert_eq!(first.status, IngestStatus::Evaluated);
	assert_eq!(
		first.evaluation.as_ref().and_then(|evaluation| evaluation.reason),
		Some(HandoverReason::IntentTrigger)
	);
	assert_eq!(replay.status, IngestStatus::Duplicate);
	assert_eq!(later.status, IngestStatus::Stored);

	let dispatched = service
		.dispatch_next_notification()
		.await
		.expect("Dispatch should succeed.")
		.expect("A notification should be due.");

	assert!(dispatched.report.delivered);
	assert_eq!(Some(dispatched.outbox_id), first.outbox_id);

	let messages = queries::list_messages(&db.pool, first.conversation_id)
		.await
		.expect("Failed to list messages.");

	assert_eq!(messages.len(), 2);

	let evaluations = queries::list_evaluations(&db.pool, first.conversation_id)
		.await
		.expect("Failed to list evaluations.");

	assert_eq!(evaluations.len(), 1);
	assert_eq!(evaluations[0].reason.as_deref(), Some("intent_trigger"));

	let entry = outbox::get_notification(&db, dispatched.outbox_id)
		.await
		.expect("Failed to load notification.")
		.expect("Notification row should exist.");

	assert_eq!(entry.status, STATUS_DONE);
	assert_eq!(entry.attempts, serde_json::json!([204]));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
