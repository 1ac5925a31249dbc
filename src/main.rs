//! prometheus alertmanager receiver that forwards alerts into telegram chats
//!
//! Features:
//! - per alert type message templates, overridable by files in a template directory
//! - concurrent delivery to every configured chat, one chat failing never blocks the others
//! - plain text fallback if telegram rejects the markdown of a message
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use settings::Settings;

use crate::{
	alertmanager_webhook_receiver::{HealthReport, ReceiverState},
	dispatcher::Dispatcher,
};

mod alert;
mod alertmanager_webhook_receiver;
mod dispatcher;
mod fields;
mod log;
mod recipients;
mod rendered_alert;
mod renderer;
mod settings;
mod telegram;
mod telemetry_endpoint;
mod templates;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::load()?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	tracing::debug!("loaded settings: {:?}", settings);

	let registry = Registry::new();

	let dispatcher =
		Dispatcher::from_settings(&settings, &registry).context("failed to construct dispatcher")?;

	let state = ReceiverState::new(dispatcher, HealthReport::from_settings(&settings), registry)
		.context("failed to construct webhook receiver")?;

	alertmanager_webhook_receiver::run_receiver(&settings.alert_webhook_receiver, Arc::new(state)).await
}
