//! Drives alerts through template resolution, extraction, rendering and delivery.
//!
//! Alerts of a batch are processed one after another. The rendered message of
//! an alert is sent to all chats concurrently, at most [MAX_CONCURRENT_SENDS]
//! at a time; every chat gets its own outcome
//! and a failing chat never prevents delivery to the others. Nothing in here
//! fails the batch, failures are logged and counted in [BatchOutcome].

use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use prometheus::{IntCounterVec, Registry};
use serde::Serialize;

use crate::{
	alert::{self, Alert},
	fields,
	recipients::RecipientList,
	rendered_alert::RenderedMessage,
	renderer,
	settings::Settings,
	telegram::{MessageSender, ParseMode, SendError, TelegramClient},
	templates::TemplateStore,
};

/// parse mode of the first sending attempt
const RICH_PARSE_MODE: ParseMode = ParseMode::Markdown;

/// upper bound of concurrent sends of one message
const MAX_CONCURRENT_SENDS: usize = 8;

struct DispatcherMetrics {
	alerts: IntCounterVec,
	deliveries: IntCounterVec,
}

impl DispatcherMetrics {
	pub fn new(registry: &Registry) -> prometheus::Result<Self> {
		use prometheus::opts;

		let alerts = IntCounterVec::new(
			opts!("alerts_total", "number of alerts by processing result")
				.namespace("alertbridge")
				.subsystem("dispatcher"),
			&["result"],
		)?;

		let deliveries = IntCounterVec::new(
			opts!("deliveries_total", "number of per chat deliveries by result")
				.namespace("alertbridge")
				.subsystem("dispatcher"),
			&["result"],
		)?;

		registry.register(Box::new(alerts.clone()))?;
		registry.register(Box::new(deliveries.clone()))?;

		Ok(Self { alerts, deliveries })
	}
}

/// send/skip policy applied to every alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryPolicy {
	/// deliver alerts with status `resolved`
	pub send_resolved: bool,
}

/// reason why nothing can be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigGap {
	Disabled,
	MissingBotToken,
	NoRecipients,
}

impl fmt::Display for ConfigGap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConfigGap::Disabled => "telegram delivery is disabled",
			ConfigGap::MissingBotToken => "no telegram bot token configured",
			ConfigGap::NoRecipients => "no telegram chat ids configured",
		})
	}
}

/// how messages leave the process
enum Delivery {
	Ready { sender: Arc<dyn MessageSender>, recipients: RecipientList },
	Unavailable { gap: ConfigGap, recipients: usize },
}

/// outcome of delivering one message to one chat
#[derive(Debug)]
pub enum DeliveryOutcome {
	/// delivered with formatting
	Sent,
	/// delivered as plain text after telegram rejected the formatting
	SentPlain,
	Failed(SendError),
	/// nothing was sent because delivery isn't configured
	NotConfigured(ConfigGap),
}

impl DeliveryOutcome {
	pub fn is_sent(&self) -> bool {
		matches!(self, DeliveryOutcome::Sent | DeliveryOutcome::SentPlain)
	}

	fn label(&self) -> &'static str {
		match self {
			DeliveryOutcome::Sent => "sent",
			DeliveryOutcome::SentPlain => "sent_plain",
			DeliveryOutcome::Failed(_) => "failed",
			DeliveryOutcome::NotConfigured(_) => "not_configured",
		}
	}
}

/// aggregate counts of one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
	/// alerts in the batch
	pub alerts: usize,
	/// alerts rendered and handed to delivery
	pub processed: usize,
	/// alerts skipped by the [DeliveryPolicy]
	pub skipped: usize,
	/// successful per chat deliveries
	pub sent: usize,
	/// failed per chat deliveries, including deliveries impossible due to configuration
	pub failed: usize,
}

pub struct Dispatcher {
	templates: TemplateStore,
	delivery: Delivery,
	policy: DeliveryPolicy,
	metrics: DispatcherMetrics,
}

impl Dispatcher {
	/// Constructs a [Dispatcher]. Without `sender` every delivery is recorded as failed.
	///
	/// # Arguments
	///
	/// * `templates` - templates used to render alerts
	///
	/// * `sender` - the message sender, or the reason why there is none
	///
	/// * `recipients` - chats every alert is sent to, in order
	///
	/// * `policy` - send/skip policy
	///
	/// * `registry` - registry the dispatcher metrics are registered in
	pub fn new(
		templates: TemplateStore,
		sender: Result<Arc<dyn MessageSender>, ConfigGap>,
		recipients: RecipientList,
		policy: DeliveryPolicy,
		registry: &Registry,
	) -> Result<Self> {
		let delivery = match sender {
			Ok(_) if recipients.is_empty() => {
				Delivery::Unavailable { gap: ConfigGap::NoRecipients, recipients: 0 }
			}
			Ok(sender) => Delivery::Ready { sender, recipients },
			Err(gap) => Delivery::Unavailable { gap, recipients: recipients.len() },
		};

		if let Delivery::Unavailable { gap, .. } = &delivery {
			tracing::warn!("{}, alerts will be logged but not delivered", gap);
		}

		let metrics = DispatcherMetrics::new(registry).context("failed to register dispatcher metrics")?;

		Ok(Self { templates, delivery, policy, metrics })
	}

	/// Constructs a [Dispatcher] sending via the telegram Bot API as configured in `settings`.
	pub fn from_settings(settings: &Settings, registry: &Registry) -> Result<Self> {
		let telegram = &settings.telegram;

		let sender: Result<Arc<dyn MessageSender>, ConfigGap> = match telegram.bot_token() {
			_ if !telegram.enabled => Err(ConfigGap::Disabled),
			None => Err(ConfigGap::MissingBotToken),
			Some(token) => {
				let client = TelegramClient::new(&telegram.api_url, token, telegram.send_timeout, registry)
					.context("failed to construct telegram client")?;
				Ok(Arc::new(client))
			}
		};

		Self::new(
			TemplateStore::new(settings.templates_dir.clone()),
			sender,
			telegram.chat_ids.clone(),
			DeliveryPolicy { send_resolved: settings.send_resolved_alerts },
			registry,
		)
	}

	/// Processes all alerts of `batch`. Always runs to completion.
	pub async fn process_batch(&self, batch: &alert::Data) -> BatchOutcome {
		let mut outcome = BatchOutcome { alerts: batch.alerts.len(), ..Default::default() };

		tracing::info!(
			group_key = %batch.group_key,
			status = %batch.status,
			"received {} alert(s)",
			batch.alerts.len()
		);

		for alert in &batch.alerts {
			self.process_alert(alert, &mut outcome).await;
		}

		tracing::info!(
			group_key = %batch.group_key,
			processed = outcome.processed,
			skipped = outcome.skipped,
			sent = outcome.sent,
			failed = outcome.failed,
			"batch processed"
		);

		outcome
	}

	async fn process_alert(&self, alert: &Alert, outcome: &mut BatchOutcome) {
		if alert.is_resolved() && !self.policy.send_resolved {
			tracing::info!(
				alertname = alert.label("alertname").unwrap_or("Unknown"),
				"skipping resolved alert, sending resolved alerts is disabled"
			);
			self.metrics.alerts.with_label_values(&["skipped"]).inc();
			outcome.skipped += 1;
			return;
		}

		let fields = fields::extract(alert);
		let template = self.templates.resolve(&fields.alertname, alert.label("alert_type"));
		let message = RenderedMessage::new(&fields, renderer::render(&template, &fields));

		self.metrics.alerts.with_label_values(&["processed"]).inc();
		outcome.processed += 1;

		for result in self.deliver(&message).await {
			self.metrics.deliveries.with_label_values(&[result.label()]).inc();

			if result.is_sent() {
				outcome.sent += 1;
			} else {
				outcome.failed += 1;
			}
		}
	}

	/// sends `message` to every chat, one outcome per chat
	async fn deliver(&self, message: &RenderedMessage) -> Vec<DeliveryOutcome> {
		match &self.delivery {
			Delivery::Ready { sender, recipients } => {
				let sends = recipients
					.iter()
					.map(|chat_id| deliver_to(sender.as_ref(), chat_id, message))
					.collect::<Vec<_>>();
				stream::iter(sends)
					.buffered(MAX_CONCURRENT_SENDS)
					.collect::<Vec<_>>()
					.await
			}
			Delivery::Unavailable { gap, recipients } => {
				tracing::error!(
					alertname = %message.alertname,
					instance = %message.instance,
					"can't deliver alert: {}",
					gap
				);

				(0..(*recipients).max(1))
					.map(|_| DeliveryOutcome::NotConfigured(*gap))
					.collect()
			}
		}
	}
}

/// Sends `message` to a single chat. A formatting rejection is retried once as plain text.
async fn deliver_to(sender: &dyn MessageSender, chat_id: &str, message: &RenderedMessage) -> DeliveryOutcome {
	let err = match sender.send_message(chat_id, message.text(), RICH_PARSE_MODE).await {
		Ok(()) => {
			tracing::info!(alertname = %message.alertname, instance = %message.instance, chat_id, "sent alert");
			return DeliveryOutcome::Sent;
		}
		Err(err) => err,
	};

	if !err.is_formatting() {
		tracing::error!(
			alertname = %message.alertname,
			instance = %message.instance,
			chat_id,
			"failed to send alert: {}",
			err
		);
		return DeliveryOutcome::Failed(err);
	}

	tracing::warn!(
		alertname = %message.alertname,
		instance = %message.instance,
		chat_id,
		"{}, retrying as plain text",
		err
	);

	let plain = renderer::strip_markup(message.text());

	match sender.send_message(chat_id, &plain, ParseMode::Plain).await {
		Ok(()) => {
			tracing::info!(alertname = %message.alertname, instance = %message.instance, chat_id, "sent alert as plain text");
			DeliveryOutcome::SentPlain
		}
		Err(err) => {
			tracing::error!(
				alertname = %message.alertname,
				instance = %message.instance,
				chat_id,
				"failed to send alert as plain text: {}",
				err
			);
			DeliveryOutcome::Failed(err)
		}
	}
}
