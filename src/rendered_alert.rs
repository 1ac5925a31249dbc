//! A rendered alert ready for delivery. Messages exceeding telegram's size
//! limit are truncated instead of being rejected by the Bot API.

use crate::fields::FieldSet;

/// maximum message length accepted by the telegram Bot API, in characters
pub const MAX_MESSAGE_LEN: usize = 4096;

/// appended to truncated messages
const TRUNCATION_MARKER: &str = "\n…";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Rendered message text, together with the alert it was rendered from so
/// delivery logs can be correlated with the alert.
pub struct RenderedMessage {
	/// name of the source alert
	pub alertname: String,
	/// instance of the source alert
	pub instance: String,
	/// fully substituted message text
	text: String,
}

impl RenderedMessage {
	/// Constructs a message, truncating `text` to [MAX_MESSAGE_LEN] characters.
	pub fn new(fields: &FieldSet, text: String) -> Self {
		Self {
			alertname: fields.alertname.clone(),
			instance: fields.instance.clone(),
			text: Self::truncated(text),
		}
	}

	/// truncate on a character boundary, keeping room for the marker
	fn truncated(mut text: String) -> String {
		if text.chars().count() <= MAX_MESSAGE_LEN {
			return text;
		}

		let keep = MAX_MESSAGE_LEN - TRUNCATION_MARKER.chars().count();
		if let Some((index, _)) = text.char_indices().nth(keep) {
			text.truncate(index);
		}
		text.push_str(TRUNCATION_MARKER);

		text
	}

	pub fn text(&self) -> &str {
		&self.text
	}
}
