pub mod classify;
pub mod correlate;
pub mod criteria;
pub mod events;
pub mod ingest;
pub mod locks;
pub mod notify;
pub mod store;

mod error;

pub use correlate::InsertMode;
pub use criteria::CriteriaView;
pub use error::{Error, Result};
pub use events::{DeliveryEvent, DeliveryEventOutcome};
pub use ingest::{
	InboundEmail, IngestOutcome, IngestStatus, ManualHandoverRequest, OutboundMessage,
};
pub use locks::ConversationLocks;
pub use notify::DispatchOutcome;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use handover_config::{Config, LlmProviderConfig};
use handover_domain::{retry::DeliveryReport, verdict::Verdict};
use handover_providers::{
	classifier::{self, ChatMessage},
	webhook::{WebhookClient, WebhookTarget},
};
use store::ConversationStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ClassifierProvider
where
	Self: Send + Sync,
{
	fn classify<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, handover_providers::Result<Verdict>>;
}

pub trait NotificationDispatcher
where
	Self: Send + Sync,
{
	/// Delivers one notification payload. Failures are reported, never raised.
	fn deliver<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, DeliveryReport>;
}

#[derive(Clone)]
pub struct Providers {
	pub classifier: Arc<dyn ClassifierProvider>,
	pub dispatcher: Arc<dyn NotificationDispatcher>,
}
impl Providers {
	pub fn new(
		classifier: Arc<dyn ClassifierProvider>,
		dispatcher: Arc<dyn NotificationDispatcher>,
	) -> Self {
		Self { classifier, dispatcher }
	}

	/// HTTP classifier plus the configured signed webhook.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let webhook = WebhookClient::new(WebhookTarget::from_config(&cfg.notification))?;

		Ok(Self { classifier: Arc::new(HttpClassifier), dispatcher: Arc::new(webhook) })
	}
}

struct HttpClassifier;
impl ClassifierProvider for HttpClassifier {
	fn classify<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, handover_providers::Result<Verdict>> {
		Box::pin(classifier::classify(cfg, messages))
	}
}

impl NotificationDispatcher for WebhookClient {
	fn deliver<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, DeliveryReport> {
		Box::pin(WebhookClient::deliver(self, payload))
	}
}

pub struct HandoverService {
	pub cfg: Config,
	pub store: Arc<dyn ConversationStore>,
	pub providers: Providers,
	pub locks: ConversationLocks,
	pub insert_mode: InsertMode,
}
impl HandoverService {
	pub fn new(cfg: Config, store: Arc<dyn ConversationStore>, providers: Providers) -> Self {
		Self {
			cfg,
			store,
			providers,
			locks: ConversationLocks::new(),
			insert_mode: InsertMode::default(),
		}
	}

	pub fn with_insert_mode(mut self, insert_mode: InsertMode) -> Self {
		self.insert_mode = insert_mode;

		self
	}
}
