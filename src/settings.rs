use std::{net::IpAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{builder::PossibleValuesParser, Arg, Command};
use config::{Config, Environment};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::{
    alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
    recipients::RecipientList, telegram::TelegramSettings,
};

/// environment variables read at startup, the config key is the lowercased name
const ENVIRONMENT_VARIABLES: [&str; 10] = [
    "TELEGRAM_ENABLED",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_IDS",
    "TELEGRAM_API_URL",
    "SEND_TIMEOUT",
    "SEND_RESOLVED_ALERTS",
    "BIND_ADDRESS",
    "PORT",
    "TEMPLATES_DIR",
    "DEBUG",
];

const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// flat representation matching the environment variables
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    telegram_enabled: bool,
    #[serde(default)]
    telegram_bot_token: Option<String>,
    #[serde(default)]
    telegram_chat_ids: RecipientList,
    telegram_api_url: Url,
    #[serde_as(as = "DurationSeconds<f64>")]
    send_timeout: Duration,
    send_resolved_alerts: bool,
    bind_address: IpAddr,
    port: u16,
    #[serde(default)]
    templates_dir: Option<PathBuf>,
    debug: bool,
    #[serde(default)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawSettings")]
pub struct Settings {
    pub telegram: TelegramSettings,
    pub send_resolved_alerts: bool,
    pub templates_dir: Option<PathBuf>,
    pub alert_webhook_receiver: AlertReceiverSettings,
    pub log: LogSettings,
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        let level = raw
            .log_level
            .unwrap_or_else(|| String::from(if raw.debug { "debug" } else { "info" }));

        Self {
            telegram: TelegramSettings {
                enabled: raw.telegram_enabled,
                bot_token: raw.telegram_bot_token,
                chat_ids: raw.telegram_chat_ids,
                api_url: raw.telegram_api_url,
                send_timeout: raw.send_timeout,
            },
            send_resolved_alerts: raw.send_resolved_alerts,
            templates_dir: raw
                .templates_dir
                .filter(|dir| !dir.as_os_str().is_empty()),
            alert_webhook_receiver: AlertReceiverSettings {
                bind_address: raw.bind_address,
                port: raw.port,
            },
            log: LogSettings { level },
        }
    }
}

impl Settings {
    /// Loads settings from the command line, the optional config file and the environment.
    pub fn load() -> Result<Self> {
        let opts = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args([
                Arg::new("config")
                    .help("path of optional config file, environment variables take precedence")
                    .short('c')
                    .long("config")
                    .env("ALERTBRIDGE_CONFIG")
                    .default_value(DEFAULT_CONFIG_PATH),
                Arg::new("level")
                    .help("log level")
                    .long("log")
                    .value_parser(PossibleValuesParser::new([
                        "error", "warn", "info", "debug", "trace",
                    ]))
                    .ignore_case(true),
            ])
            .get_matches();

        let config_path = opts
            .get_one::<String>("config")
            .map_or(DEFAULT_CONFIG_PATH, String::as_str);

        // a .env file is optional
        let _ = dotenvy::dotenv();

        let mut settings =
            Self::from_sources(config_path, process_environment()).context("can't load config")?;

        if let Some(level) = opts.get_one::<String>("level") {
            settings.log.level = level.to_lowercase();
        }

        Ok(settings)
    }

    /// Builds settings from defaults, the config file at `config_path` (if it exists) and `environment`.
    fn from_sources(config_path: &str, environment: Environment) -> Result<Self> {
        let conf = Config::builder()
            .set_default("telegram_enabled", true)?
            .set_default("telegram_api_url", "https://api.telegram.org")?
            .set_default("send_timeout", 10.0)?
            .set_default("send_resolved_alerts", false)?
            .set_default("bind_address", "0.0.0.0")?
            .set_default("port", 5000)?
            .set_default("debug", false)?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(environment)
            .build()
            .context("can't read config sources")?;

        conf.try_deserialize().context("invalid configuration")
    }
}

/// the known variables of the process environment
fn process_environment() -> Environment {
    let vars = ENVIRONMENT_VARIABLES
        .iter()
        .filter_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| (name.to_lowercase(), value))
        })
        .collect::<config::Map<String, String>>();

    Environment::default().source(Some(vars))
}
