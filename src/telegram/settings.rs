use std::{fmt, time::Duration};

use url::Url;

use crate::recipients::RecipientList;

#[derive(Clone)]
/// telegram specific settings
pub struct TelegramSettings {
	pub enabled: bool,
	pub bot_token: Option<String>,
	pub chat_ids: RecipientList,
	pub api_url: Url,
	pub send_timeout: Duration,
}

impl TelegramSettings {
	/// the bot token, blank tokens count as not configured
	pub fn bot_token(&self) -> Option<&str> {
		self.bot_token.as_deref().map(str::trim).filter(|token| !token.is_empty())
	}
}

// the bot token must never end up in logs
impl fmt::Debug for TelegramSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TelegramSettings")
			.field("enabled", &self.enabled)
			.field("bot_token", &self.bot_token().map(|_| "<redacted>"))
			.field("chat_ids", &self.chat_ids)
			.field("api_url", &self.api_url.as_str())
			.field("send_timeout", &self.send_timeout)
			.finish()
	}
}
