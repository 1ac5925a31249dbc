use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

/// targets limited to warnings unless `RUST_LOG` says otherwise
const QUIET_TARGETS: [&str; 2] = ["hyper=warn", "reqwest=warn"];

/// log filter for `settings`, directives in `env` (the value of `RUST_LOG`)
/// take precedence over the level and the quiet targets
fn filter(settings: &LogSettings, env: Option<&str>) -> Result<EnvFilter> {
    let level = tracing::Level::from_str(settings.level.trim())
        .with_context(|| format!("invalid log level {:?}", settings.level))?;

    // a later directive for the same target replaces an earlier one
    let mut directives = vec![LevelFilter::from_level(level).to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|directive| directive.to_string()));
    directives.extend(env.map(str::to_string));

    Ok(EnvFilter::builder().parse_lossy(directives.join(",")))
}

pub fn setup_logging(settings: &LogSettings) -> Result<()> {
    let fmt_layer = fmt::layer();

    tracing_subscriber::registry()
        .with(filter(settings, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())?)
        .with(fmt_layer)
        .try_init()
        .context("a global subscriber is already set")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str) -> LogSettings {
        LogSettings {
            level: level.to_string(),
        }
    }

    fn directives(filter: EnvFilter) -> String {
        filter.to_string().to_lowercase()
    }

    #[test]
    fn accepts_known_levels() {
        for level in ["error", "warn", "info", "DEBUG", "trace"] {
            assert!(filter(&settings(level), None).is_ok(), "{level}");
        }
    }

    #[test]
    fn rejects_unknown_levels() {
        assert!(filter(&settings("verbose"), None).is_err());
    }

    #[test]
    fn quiet_targets_apply_without_env() {
        let directives = directives(filter(&settings("debug"), None).unwrap());

        assert!(directives.contains("hyper=warn"), "{directives}");
        assert!(directives.contains("reqwest=warn"), "{directives}");
    }

    #[test]
    fn env_directives_override_defaults() {
        let directives = directives(filter(&settings("info"), Some("hyper=debug")).unwrap());

        assert!(directives.contains("hyper=debug"), "{directives}");
        assert!(!directives.contains("hyper=warn"), "{directives}");
        assert!(directives.contains("reqwest=warn"), "{directives}");
    }
}
