//! data structures for deserializing incoming alerts
//!
//! Every field is optional on input. Alertmanager always sends the full
//! envelope, but hand written test payloads and other senders often don't, and
//! a missing field should never turn a batch into a client error.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
	pub version: String,
	pub group_key: String,

	pub receiver: String,
	pub status: String,
	pub alerts: Vec<Alert>,
	pub group_labels: HashMap<String, String>,
	pub common_labels: HashMap<String, String>,
	pub common_annotations: HashMap<String, String>,
	#[serde(rename = "externalURL")]
	pub external_url: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	pub status: String,
	pub labels: HashMap<String, String>,
	pub annotations: HashMap<String, String>,
	/// kept verbatim, a malformed timestamp is displayed as is
	pub starts_at: String,
	pub ends_at: String,
	#[serde(rename = "generatorURL")]
	pub generator_url: String,
	pub fingerprint: String,
}

impl Alert {
	/// label value, empty values count as absent
	pub fn label(&self, key: &str) -> Option<&str> {
		non_empty(self.labels.get(key))
	}

	/// annotation value, empty values count as absent
	pub fn annotation(&self, key: &str) -> Option<&str> {
		non_empty(self.annotations.get(key))
	}

	pub fn is_resolved(&self) -> bool {
		self.status.eq_ignore_ascii_case("resolved")
	}
}

fn non_empty(value: Option<&String>) -> Option<&str> {
	value.map(String::as_str).filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deserializes_alertmanager_payload() {
		let data: Data = serde_json::from_str(
			r#"{
				"version": "4",
				"groupKey": "{}:{alertname=\"HighGPUUsage\"}",
				"receiver": "telegram",
				"status": "firing",
				"alerts": [{
					"status": "firing",
					"labels": {"alertname": "HighGPUUsage", "instance": "gpu-01:9400"},
					"annotations": {"description": "GPU usage is 92% on device 0"},
					"startsAt": "2024-03-01T12:00:00.123456Z",
					"endsAt": "0001-01-01T00:00:00Z",
					"generatorURL": "http://prometheus:9090/graph",
					"fingerprint": "c5a1d2"
				}],
				"groupLabels": {"alertname": "HighGPUUsage"},
				"commonLabels": {},
				"commonAnnotations": {},
				"externalURL": "http://alertmanager:9093"
			}"#,
		)
		.unwrap();

		assert_eq!(data.status, "firing");
		assert_eq!(data.alerts.len(), 1);
		assert_eq!(data.alerts[0].label("alertname"), Some("HighGPUUsage"));
		assert_eq!(data.alerts[0].starts_at, "2024-03-01T12:00:00.123456Z");
		assert_eq!(data.external_url, "http://alertmanager:9093");
	}

	#[test]
	fn missing_fields_default() {
		let data: Data = serde_json::from_str(r#"{"alerts": [{}]}"#).unwrap();

		assert!(data.status.is_empty());
		assert_eq!(data.alerts.len(), 1);
		assert!(data.alerts[0].labels.is_empty());
		assert!(!data.alerts[0].is_resolved());
	}

	#[test]
	fn empty_values_count_as_absent() {
		let mut alert = Alert::default();
		alert.labels.insert("alertname".into(), "  ".into());
		alert.annotations.insert("value".into(), String::new());

		assert_eq!(alert.label("alertname"), None);
		assert_eq!(alert.annotation("value"), None);
	}

	#[test]
	fn resolved_status_is_case_insensitive() {
		let alert = Alert { status: "Resolved".into(), ..Default::default() };

		assert!(alert.is_resolved());
	}
}
