use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use prometheus::{Histogram, IntCounterVec, Registry};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{MessageSender, ParseMode, SendError};

/// descriptions telegram uses when it can't parse the markup of a message
const PARSE_ERROR_MARKERS: [&str; 2] = ["can't parse entities", "can't parse message text"];

/// longest api error description kept for logging
const MAX_DESCRIPTION_LEN: usize = 256;

#[derive(Debug, Clone)]
struct Metrics {
	http_requests: IntCounterVec,
	http_request_duration: Histogram,
}

impl Metrics {
	pub fn new(registry: &Registry) -> prometheus::Result<Self> {
		use prometheus::{exponential_buckets, histogram_opts, opts};

		let http_requests = IntCounterVec::new(
			opts!("http_requests_total", "total number of bot api requests by outcome")
				.namespace("alertbridge")
				.subsystem("telegram"),
			&["outcome"],
		)?;

		let http_request_duration = Histogram::with_opts(
			histogram_opts!(
				"http_request_duration_seconds",
				"total time of a bot api request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertbridge")
			.subsystem("telegram"),
		)?;

		registry.register(Box::new(http_requests.clone()))?;
		registry.register(Box::new(http_request_duration.clone()))?;

		Ok(Self { http_requests, http_request_duration })
	}
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
	chat_id: &'a str,
	text: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
	ok: bool,
	#[serde(default)]
	description: Option<String>,
}

/// Bot API client. Deliberately not [Debug], the send url contains the bot token.
pub struct TelegramClient {
	http: reqwest::Client,
	send_message_url: Url,
	timeout: Duration,
	metrics: Metrics,
}

impl TelegramClient {
	/// Constructs a client for the bot identified by `bot_token`.
	///
	/// # Arguments
	///
	/// * `api_url` - base url of the Bot API, usually `https://api.telegram.org`
	///
	/// * `timeout` - upper bound for a single `sendMessage` request
	///
	/// * `registry` - registry the client metrics are registered in
	pub fn new(api_url: &Url, bot_token: &str, timeout: Duration, registry: &Registry) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.build()
			.context("failed to build http client")?;

		// the token contains a ':' so it can't go through Url::join
		let mut send_message_url = api_url.clone();
		send_message_url
			.path_segments_mut()
			.map_err(|()| anyhow!("telegram api url {api_url} can't be a base url"))?
			.pop_if_empty()
			.push(&format!("bot{bot_token}"))
			.push("sendMessage");

		let metrics = Metrics::new(registry).context("failed to register telegram client metrics")?;

		Ok(Self { http, send_message_url, timeout, metrics })
	}

	async fn post(&self, request: &SendMessageRequest<'_>) -> Result<(), SendError> {
		let response = self
			.http
			.post(self.send_message_url.clone())
			.json(request)
			.send()
			.await
			.map_err(|err| self.transport_error(err))?;

		let status = response.status();
		let body = response.text().await.map_err(|err| self.transport_error(err))?;
		let api_response = serde_json::from_str::<ApiResponse>(&body).ok();

		if status.is_success() && api_response.as_ref().map_or(true, |response| response.ok) {
			return Ok(());
		}

		let mut description = api_response
			.and_then(|response| response.description)
			.unwrap_or_else(|| body.trim().to_string());
		if let Some((index, _)) = description.char_indices().nth(MAX_DESCRIPTION_LEN) {
			description.truncate(index);
		}

		if status == StatusCode::BAD_REQUEST && is_parse_error(&description) {
			return Err(SendError::Formatting(description));
		}

		Err(SendError::Api { status: status.as_u16(), description })
	}

	fn transport_error(&self, err: reqwest::Error) -> SendError {
		if err.is_timeout() {
			SendError::Timeout(self.timeout)
		} else {
			SendError::Transport(err.without_url())
		}
	}
}

#[async_trait]
impl MessageSender for TelegramClient {
	async fn send_message(&self, chat_id: &str, text: &str, parse_mode: ParseMode) -> Result<(), SendError> {
		let request = SendMessageRequest { chat_id, text, parse_mode: parse_mode.as_api_str() };

		let result = {
			let _timer = self.metrics.http_request_duration.start_timer();
			self.post(&request).await
		};

		let outcome = match &result {
			Ok(()) => "ok",
			Err(err) => err.kind(),
		};
		self.metrics.http_requests.with_label_values(&[outcome]).inc();

		result
	}
}

fn is_parse_error(description: &str) -> bool {
	let description = description.to_lowercase();

	PARSE_ERROR_MARKERS.iter().any(|marker| description.contains(marker))
}
