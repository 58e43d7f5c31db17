//! http endpoint receiving alertmanager webhooks (`POST /alert`) plus a liveness probe (`GET /healthz`)
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
	extract::{rejection::JsonRejection, Extension, Json},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Router,
};
use serde_json::Value;

use crate::{
	alert,
	dispatcher::{Dispatcher, NotifyResponse},
	metrics::Metrics,
};

/// body of the 400 response for anything that isn't an alertmanager payload
pub const MALFORMED_PAYLOAD_MESSAGE: &str =
	"Make sure that `Content-Type: application/json` is set and that the key `alerts` exists.";

/// `<version>-<build>`, the build is taken from the `BUILD` environment variable at compile time
pub fn version() -> String {
	format!("{}-{}", env!("CARGO_PKG_VERSION"), option_env!("BUILD").unwrap_or("dev"))
}

/// name and version reported by the health endpoint
pub fn identity() -> String {
	format!("{} {}", env!("CARGO_PKG_NAME"), version())
}

impl IntoResponse for NotifyResponse {
	fn into_response(self) -> Response {
		let status = if self.is_success() { StatusCode::OK } else { StatusCode::BAD_GATEWAY };

		(status, self.to_string()).into_response()
	}
}

async fn alert_receiver(
	Extension(dispatcher): Extension<Arc<Dispatcher>>,
	body: Result<Json<Value>, JsonRejection>,
) -> Response {
	let metrics = Metrics::global();

	let batch = body
		.map_err(|rejection| rejection.to_string())
		.and_then(|Json(raw)| alert::Data::parse(raw).map_err(|err| err.to_string()));

	let batch = match batch {
		Ok(batch) => batch,
		Err(reason) => {
			tracing::error!("{MALFORMED_PAYLOAD_MESSAGE} ({reason})");
			metrics.webhook_requests.with_label_values(&["malformed"]).inc();
			return (StatusCode::BAD_REQUEST, MALFORMED_PAYLOAD_MESSAGE).into_response();
		}
	};

	tracing::info!("Received {} alert(s).", batch.alerts.len());
	tracing::debug!("Parsing content: {batch:?}");

	metrics.webhook_requests.with_label_values(&["dispatched"]).inc();
	metrics.received_alerts.inc_by(batch.alerts.len() as u64);

	dispatcher.notify(batch).await.into_response()
}

async fn healthz() -> String {
	identity()
}

/// routes of the webhook receiver
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
	Router::new()
		.route("/alert", post(alert_receiver))
		.route("/healthz", get(healthz))
		.layer(Extension(dispatcher))
}

/// serve the webhook receiver on `addr` until the server fails
pub async fn run_alert_receiver(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<()> {
	axum::Server::try_bind(&addr)
		.context(format!("failed to bind alert receiver to {addr}"))?
		.serve(router(dispatcher).into_make_service())
		.await
		.context("alert receiver crashed")?;

	Ok(())
}
