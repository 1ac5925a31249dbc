//! Delivery of rendered messages to telegram chats.
//!
//! [MessageSender] is the seam between the [Dispatcher][crate::dispatcher::Dispatcher]
//! and the Bot API, [TelegramClient] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::{client::TelegramClient, settings::TelegramSettings};

mod client;
mod settings;

/// telegram `parse_mode` of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
	/// legacy telegram markdown, `*bold*`, `_italic_`, `` `code` ``
	Markdown,
	/// no formatting, the text is displayed as is
	Plain,
}

impl ParseMode {
	/// value of the `parse_mode` field, [None] omits the field
	pub fn as_api_str(&self) -> Option<&'static str> {
		match self {
			ParseMode::Markdown => Some("Markdown"),
			ParseMode::Plain => None,
		}
	}
}

/// Error occurring when sending a message
#[derive(Error, Debug)]
pub enum SendError {
	/// the request didn't complete within the configured timeout
	#[error("request timed out after {0:?}")]
	Timeout(Duration),
	/// connection or protocol error, the request url is stripped because it contains the bot token
	#[error("http request failed: {0}")]
	Transport(#[source] reqwest::Error),
	/// telegram couldn't parse the formatting of the message
	#[error("telegram rejected message formatting: {0}")]
	Formatting(String),
	/// any other error reported by the Bot API
	#[error("telegram api error (status {status}): {description}")]
	Api { status: u16, description: String },
}

impl SendError {
	/// true if the message is worth retrying without markup
	pub fn is_formatting(&self) -> bool {
		matches!(self, SendError::Formatting(_))
	}

	/// short label for metrics
	pub fn kind(&self) -> &'static str {
		match self {
			SendError::Timeout(_) => "timeout",
			SendError::Transport(_) => "transport",
			SendError::Formatting(_) => "formatting",
			SendError::Api { .. } => "api",
		}
	}
}

/// Capability to send one text message to one chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
	async fn send_message(&self, chat_id: &str, text: &str, parse_mode: ParseMode) -> Result<(), SendError>;
}
