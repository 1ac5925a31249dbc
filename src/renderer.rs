//! Renders alerts into message text.
//!
//! Deliberately not a template engine: `{{ name }}` placeholders are replaced
//! by the fields of a [FieldSet], nothing else is interpreted.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::{fields::FieldSet, templates::Template};

/// text substituted for placeholders without a value
pub const MISSING_VALUE: &str = "N/A";

/// a placeholder with a plain identifier, e.g. `{{ instance }}`
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::unwrap_used)]
	Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap()
});

/// anything that still looks like template syntax, e.g. `{{ labels.job }}`
static LEFTOVER_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::unwrap_used)]
	Regex::new(r"\{\{[^{}]*\}\}").unwrap()
});

/// markup characters of the telegram `Markdown` parse mode
const MARKUP_CHARS: [char; 5] = ['*', '_', '`', '[', ']'];

/// Substitutes `fields` into `template`. Unknown placeholders become
/// [MISSING_VALUE], the output never contains `{{ ... }}`.
pub fn render(template: &Template, fields: &FieldSet) -> String {
	let substituted = PLACEHOLDER.replace_all(template.as_str(), |captures: &Captures| {
		fields.get(&captures[1]).unwrap_or(MISSING_VALUE).to_string()
	});

	match LEFTOVER_PLACEHOLDER.replace_all(&substituted, MISSING_VALUE) {
		Cow::Borrowed(_) => substituted.trim().to_string(),
		Cow::Owned(cleaned) => {
			tracing::debug!(source = %template.source, "unsupported placeholders replaced with {MISSING_VALUE}");
			cleaned.trim().to_string()
		}
	}
}

/// Removes markup characters, used when telegram refuses to parse a message.
pub fn strip_markup(text: &str) -> String {
	text.chars().filter(|c| !MARKUP_CHARS.contains(c)).collect()
}
