//! Message templates, keyed by alert name or alert category.
//!
//! Built-in templates are compiled into the binary. If a template directory is
//! configured, `<dir>/<key>.txt` overrides the built-in template for `key`.
//! Files are read on every resolution so templates can be edited while running.

use std::{
	collections::HashMap,
	fmt, fs, io,
	path::{Path, PathBuf},
	sync::Arc,
};

use crate::fields::Category;

/// key of the generic fallback template
pub const DEFAULT_KEY: &str = "default";

const BUILTIN_TEMPLATES: [(&str, &str); 9] = [
	("HighRAMUsage", include_str!("../templates/HighRAMUsage.txt")),
	("HighGPUUsage", include_str!("../templates/HighGPUUsage.txt")),
	("CPUCoreImbalance", include_str!("../templates/CPUCoreImbalance.txt")),
	("HighCPUTemperature", include_str!("../templates/HighCPUTemperature.txt")),
	("temperature", include_str!("../templates/temperature.txt")),
	("cpu", include_str!("../templates/cpu.txt")),
	("gpu", include_str!("../templates/gpu.txt")),
	("ram", include_str!("../templates/ram.txt")),
	(DEFAULT_KEY, include_str!("../templates/default.txt")),
];

/// where a template was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
	Builtin(String),
	File(PathBuf),
}

impl fmt::Display for TemplateSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TemplateSource::Builtin(key) => write!(f, "builtin:{key}"),
			TemplateSource::File(path) => write!(f, "file:{}", path.display()),
		}
	}
}

/// Template text with `{{ name }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
	pub source: TemplateSource,
	pub text: Arc<str>,
}

impl Template {
	pub fn as_str(&self) -> &str {
		&self.text
	}
}

/// Immutable set of templates, cheap to share between requests.
#[derive(Debug, Clone)]
pub struct TemplateStore {
	builtin: HashMap<String, Template>,
	template_dir: Option<PathBuf>,
}

impl TemplateStore {
	/// Store with the built-in templates, optionally overridden by files in `template_dir`.
	pub fn new(template_dir: Option<PathBuf>) -> Self {
		let builtin = BUILTIN_TEMPLATES
			.iter()
			.map(|(key, text)| {
				let template = Template {
					source: TemplateSource::Builtin(key.to_string()),
					text: Arc::from(*text),
				};

				(key.to_string(), template)
			})
			.collect();

		if let Some(dir) = &template_dir {
			tracing::info!("template overrides are read from {}", dir.display());
		}

		Self { builtin, template_dir }
	}

	/// Resolves the template for an alert. Lookup order:
	///
	/// 1. the exact alert name
	/// 2. the explicit category label (`alert_type`), if any
	/// 3. the category inferred from the alert name
	/// 4. the generic [DEFAULT_KEY] template
	///
	/// Never fails, the generic template always exists.
	pub fn resolve(&self, alert_name: &str, explicit_category: Option<&str>) -> Template {
		let explicit_category = explicit_category
			.map(|category| category.trim().to_lowercase())
			.filter(|category| !category.is_empty());

		let inferred = Category::infer(alert_name);

		let candidates = std::iter::once(alert_name.to_string())
			.chain(explicit_category)
			.chain((inferred != Category::Default).then(|| inferred.to_string()));

		for key in candidates {
			if let Some(template) = self.lookup(&key) {
				tracing::debug!(alert_name, key = %key, source = %template.source, "resolved template");
				return template;
			}
		}

		self.lookup(DEFAULT_KEY).unwrap_or_else(|| Template {
			source: TemplateSource::Builtin(DEFAULT_KEY.to_string()),
			text: Arc::from(BUILTIN_TEMPLATES[BUILTIN_TEMPLATES.len() - 1].1),
		})
	}

	/// template file first, built-in second
	fn lookup(&self, key: &str) -> Option<Template> {
		self.read_override(key).or_else(|| self.builtin.get(key).cloned())
	}

	fn read_override(&self, key: &str) -> Option<Template> {
		let dir = self.template_dir.as_deref()?;

		if !is_safe_key(key) {
			tracing::debug!(key, "template key is not a valid file name, skipping template directory");
			return None;
		}

		let path = dir.join(format!("{key}.txt"));

		match read_template_file(&path) {
			Ok(text) => Some(Template { source: TemplateSource::File(path), text: Arc::from(text) }),
			Err(err) if err.kind() == io::ErrorKind::NotFound => None,
			Err(err) => {
				tracing::warn!("failed to read template {}, using built-in: {}", path.display(), err);
				None
			}
		}
	}
}

fn read_template_file(path: &Path) -> io::Result<String> {
	let text = fs::read_to_string(path)?;

	if text.trim().is_empty() {
		return Err(io::Error::new(io::ErrorKind::InvalidData, "template file is empty"));
	}

	Ok(text)
}

/// alert names come from the network and must not escape the template directory
fn is_safe_key(key: &str) -> bool {
	!key.is_empty()
		&& !key.starts_with('.')
		&& key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
