//! Derives the renderable fields of an alert.
//!
//! Extraction is total: every field has a default, so a template can always be
//! rendered no matter how sparse the incoming alert is.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::alert::Alert;

/// number directly followed by one of the known units. A single space between
/// number and unit is tolerated, alertmanager descriptions are hand written.
static VALUE_WITH_UNIT: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::unwrap_used)]
	Regex::new(r"(?i)([0-9]+(?:[.,][0-9]+)?) ?(°C|%|MHz|MB)").unwrap()
});

/// `<date>T<time>.<fraction><rest>`, used to cut fractions down to microseconds
static FRACTIONAL_SECONDS: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::unwrap_used)]
	Regex::new(r"^(?P<head>.+[T ][0-9]{2}:[0-9]{2}:[0-9]{2})\.(?P<fraction>[0-9]+)(?P<tail>.*)$").unwrap()
});

/// `temperature` anywhere, `temp` only where a word starts (`gpu_temp`, `NodeTemp`), not in `Attempts`
static TEMPERATURE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::unwrap_used)]
	Regex::new(r"(?i:temperature)|(?:^|[^A-Za-z])(?i:temp)|Temp|[a-z0-9]TEMP").unwrap()
});

/// Alert category, used as the coarser template key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
	Temperature,
	Cpu,
	Gpu,
	Ram,
	Default,
}

impl Category {
	/// keywords in priority order after temperature, the first category with a matching keyword wins
	const KEYWORDS: [(Category, &'static [&'static str]); 3] = [
		(Category::Cpu, &["cpu", "core"]),
		(Category::Gpu, &["gpu"]),
		(Category::Ram, &["ram", "memory"]),
	];

	/// Infers the category from case-insensitive substrings of the alert name.
	pub fn infer(alert_name: &str) -> Self {
		if TEMPERATURE_KEYWORD.is_match(alert_name) {
			return Category::Temperature;
		}

		let name = alert_name.to_lowercase();

		Self::KEYWORDS
			.iter()
			.find(|(_, keywords)| keywords.iter().any(|keyword| name.contains(keyword)))
			.map_or(Category::Default, |(category, _)| *category)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Category::Temperature => "temperature",
			Category::Cpu => "cpu",
			Category::Gpu => "gpu",
			Category::Ram => "ram",
			Category::Default => "default",
		}
	}
}

impl fmt::Display for Category {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The canonical fields of an alert, ready for substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSet {
	pub alertname: String,
	pub instance: String,
	pub severity: String,
	pub value: String,
	pub time: String,
	pub description: String,
	pub status: String,
	/// either the `alert_type` label or the category inferred from the alert name
	pub category: String,
}

impl FieldSet {
	/// placeholder names recognized by the renderer
	pub const PLACEHOLDERS: [&'static str; 8] = [
		"alertname",
		"instance",
		"severity",
		"value",
		"time",
		"description",
		"status",
		"category",
	];

	/// Value of the placeholder `name`, [None] for unknown placeholders.
	pub fn get(&self, name: &str) -> Option<&str> {
		let value = match name {
			"alertname" => &self.alertname,
			"instance" => &self.instance,
			"severity" => &self.severity,
			"value" => &self.value,
			"time" => &self.time,
			"description" => &self.description,
			"status" => &self.status,
			"category" => &self.category,
			_ => return None,
		};

		Some(value.as_str())
	}
}

/// Extracts the renderable fields of `alert`.
pub fn extract(alert: &Alert) -> FieldSet {
	let alertname = alert.label("alertname").unwrap_or("Unknown").to_string();

	let instance = alert
		.label("instance")
		.or_else(|| alert.label("exported_instance"))
		.unwrap_or("unknown")
		.to_string();

	let severity = alert.label("severity").unwrap_or("unknown").to_uppercase();

	let description = alert
		.annotation("description")
		.or_else(|| alert.annotation("summary"))
		.unwrap_or("No description")
		.to_string();

	let value = match alert.annotation("value") {
		Some(value) => value.to_string(),
		None => value_from_text(&description).unwrap_or_else(|| String::from("N/A")),
	};

	let status = if alert.status.trim().is_empty() {
		String::from("UNKNOWN")
	} else {
		alert.status.to_uppercase()
	};

	let category = category_of(alert, &alertname);

	FieldSet {
		alertname,
		instance,
		severity,
		value,
		time: format_time(&alert.starts_at),
		description,
		status,
		category,
	}
}

/// `alert_type` label if present, inferred category otherwise
fn category_of(alert: &Alert, alertname: &str) -> String {
	match alert.label("alert_type") {
		Some(alert_type) => alert_type.trim().to_lowercase(),
		None => Category::infer(alertname).to_string(),
	}
}

/// Finds the first number followed by a known unit, e.g. `92%` in
/// `"GPU usage is 92% on device 0"`. Units are returned in canonical spelling.
pub fn value_from_text(text: &str) -> Option<String> {
	let captures = VALUE_WITH_UNIT.captures(text)?;

	let number = captures.get(1)?.as_str();
	let unit = match captures.get(2)?.as_str().to_lowercase().as_str() {
		"°c" => "°C",
		"%" => "%",
		"mhz" => "MHz",
		"mb" => "MB",
		_ => return None,
	};

	Some(format!("{number}{unit}"))
}

/// Formats an ISO-8601 timestamp as `%Y-%m-%d %H:%M:%S UTC`. Unparsable input
/// is returned verbatim.
pub fn format_time(raw: &str) -> String {
	match parse_time(raw) {
		Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
		None => raw.to_string(),
	}
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
	let normalized = normalize_time(raw.trim());

	if let Ok(time) = DateTime::parse_from_rfc3339(&normalized) {
		return Some(time.with_timezone(&Utc));
	}

	// timestamps without an offset are taken as UTC
	["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
		.map(|time| time.and_utc())
}

/// cuts fractional seconds to at most 6 digits and spells a trailing `Z` as `+00:00`
fn normalize_time(raw: &str) -> String {
	let mut normalized = match FRACTIONAL_SECONDS.captures(raw) {
		Some(captures) => {
			let fraction = &captures["fraction"];
			let fraction = match fraction.char_indices().nth(6) {
				Some((index, _)) => &fraction[..index],
				None => fraction,
			};

			format!("{}.{}{}", &captures["head"], fraction, &captures["tail"])
		}
		None => raw.to_string(),
	};

	if normalized.ends_with('Z') || normalized.ends_with('z') {
		normalized.pop();
		normalized.push_str("+00:00");
	}

	normalized
}

#[cfg(test)]
mod tests {
	use super::*;

	fn alert(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> Alert {
		Alert {
			status: String::from("firing"),
			labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
			annotations: annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
			starts_at: String::from("2024-03-01T12:00:00Z"),
			..Default::default()
		}
	}

	#[test]
	fn empty_alert_gets_defaults() {
		let fields = extract(&Alert::default());

		assert_eq!(fields.alertname, "Unknown");
		assert_eq!(fields.instance, "unknown");
		assert_eq!(fields.severity, "UNKNOWN");
		assert_eq!(fields.value, "N/A");
		assert_eq!(fields.description, "No description");
		assert_eq!(fields.status, "UNKNOWN");
		assert_eq!(fields.time, "");
		assert_eq!(fields.category, "default");
	}

	#[test]
	fn labels_and_annotations_are_used() {
		let fields = extract(&alert(
			&[("alertname", "HighRAMUsage"), ("instance", "node-1:9100"), ("severity", "warning")],
			&[("description", "RAM usage above 90%"), ("value", "93.2%")],
		));

		assert_eq!(fields.alertname, "HighRAMUsage");
		assert_eq!(fields.instance, "node-1:9100");
		assert_eq!(fields.severity, "WARNING");
		assert_eq!(fields.value, "93.2%");
		assert_eq!(fields.time, "2024-03-01 12:00:00 UTC");
		assert_eq!(fields.status, "FIRING");
		assert_eq!(fields.category, "ram");
	}

	#[test]
	fn instance_falls_back_to_exported_instance() {
		let fields = extract(&alert(&[("exported_instance", "gpu-box")], &[]));

		assert_eq!(fields.instance, "gpu-box");
	}

	#[test]
	fn description_falls_back_to_summary() {
		let fields = extract(&alert(&[], &[("summary", "CPU at 97% on core 3")]));

		assert_eq!(fields.description, "CPU at 97% on core 3");
		assert_eq!(fields.value, "97%");
	}

	#[test]
	fn value_is_extracted_from_description() {
		assert_eq!(value_from_text("GPU usage is 92% on device 0").as_deref(), Some("92%"));
		assert_eq!(value_from_text("CPU temperature reached 87.5°C").as_deref(), Some("87.5°C"));
		assert_eq!(value_from_text("clock dropped to 300 mhz").as_deref(), Some("300MHz"));
		assert_eq!(value_from_text("only 512mb free").as_deref(), Some("512MB"));
		assert_eq!(value_from_text("device 0 is unhappy"), None);
		assert_eq!(value_from_text(""), None);
	}

	#[test]
	fn description_without_unit_yields_na() {
		let fields = extract(&alert(&[], &[("description", "node 3 is down since 5 minutes")]));

		assert_eq!(fields.value, "N/A");
	}

	#[test]
	fn time_is_formatted_as_utc() {
		assert_eq!(format_time("2024-03-01T12:00:00.123456Z"), "2024-03-01 12:00:00 UTC");
		assert_eq!(format_time("2024-03-01T12:00:00.123456789123Z"), "2024-03-01 12:00:00 UTC");
		assert_eq!(format_time("2024-03-01T14:30:00+02:00"), "2024-03-01 12:30:00 UTC");
		assert_eq!(format_time("2024-03-01T12:00:00"), "2024-03-01 12:00:00 UTC");
	}

	#[test]
	fn invalid_time_is_kept_verbatim() {
		assert_eq!(format_time("not-a-date"), "not-a-date");
		assert_eq!(format_time(""), "");
	}

	#[test]
	fn non_ascii_digits_in_time_are_kept_verbatim() {
		let raw = "2024-03-01T12:00:00.11\u{0966}\u{0966}Z";
		assert_eq!(format_time(raw), raw);

		let raw = "2024-03-01T12:00:00.1234567\u{0966}Z";
		assert_eq!(format_time(raw), raw);

		let fields = extract(&Alert { starts_at: raw.to_string(), ..Default::default() });
		assert_eq!(fields.time, raw);
	}

	#[test]
	fn category_inference_follows_priority() {
		assert_eq!(Category::infer("HighCPUTemperature"), Category::Temperature);
		assert_eq!(Category::infer("gpu_temp_high"), Category::Temperature);
		assert_eq!(Category::infer("CPUCoreImbalance"), Category::Cpu);
		assert_eq!(Category::infer("HighGPUUsage"), Category::Gpu);
		assert_eq!(Category::infer("HighGPUMemory"), Category::Gpu);
		assert_eq!(Category::infer("highramusage"), Category::Ram);
		assert_eq!(Category::infer("DiskFull"), Category::Default);
	}

	#[test]
	fn temp_matches_only_at_word_start() {
		assert_eq!(Category::infer("NodeTempHigh"), Category::Temperature);
		assert_eq!(Category::infer("CPUTemp"), Category::Temperature);
		assert_eq!(Category::infer("temp-sensor-fault"), Category::Temperature);
		assert_eq!(Category::infer("SENSOR_TEMP"), Category::Temperature);
		assert_eq!(Category::infer("nodetemperaturehigh"), Category::Temperature);
		assert_eq!(Category::infer("LoginAttemptsHigh"), Category::Default);
		assert_eq!(Category::infer("ATTEMPTS_EXCEEDED"), Category::Default);
		assert_eq!(Category::infer("ContemptuousGPU"), Category::Gpu);
	}

	#[test]
	fn alert_type_label_overrides_inference() {
		let fields = extract(&alert(&[("alertname", "HighGPUUsage"), ("alert_type", "Disk")], &[]));

		assert_eq!(fields.category, "disk");
	}

	#[test]
	fn unknown_placeholders_have_no_value() {
		let fields = extract(&Alert::default());

		for name in FieldSet::PLACEHOLDERS {
			assert!(fields.get(name).is_some(), "{name} has no value");
		}
		assert_eq!(fields.get("cluster"), None);
	}
}
