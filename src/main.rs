use std::sync::Arc;

use alertmanager_notifier::{
	alertmanager_webhook_receiver::{self, identity},
	dispatcher::Dispatcher,
	log,
	settings::Settings,
	telemetry_endpoint,
};
use anyhow::{Context, Result};

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

	// tracing isn't setup yet, errors are printed by the returned result
	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log_level).context("could not setup logging")?;

	let result = run(settings).await;
	if let Err(err) = &result {
		tracing::error!("{err:#}");
	}

	result
}

async fn run(settings: Settings) -> Result<()> {
	let addr = settings.listen_addr()?;

	tracing::info!("Starting {}, listening on {addr}", identity());

	let dispatcher = Dispatcher::from_settings(&settings).context("failed to start notifiers")?;

	if let Some(metrics_addr) = settings.metrics_addr()? {
		tracing::info!("serving metrics on {metrics_addr}");
		tokio::spawn(async move {
			if let Err(err) = telemetry_endpoint::run_telemetry_endpoint(metrics_addr).await {
				tracing::error!("{err:#}");
			}
		});
	}

	alertmanager_webhook_receiver::run_alert_receiver(addr, Arc::new(dispatcher)).await
}
