//! Here we expose prometheus metrics about the notifier
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
	http::{header::CONTENT_TYPE, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use prometheus::{Encoder, TextEncoder};

async fn metrics_handler() -> Response {
	let mut buffer = vec![];
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();

	if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!("failed to encode metrics: {err}");
		return StatusCode::INTERNAL_SERVER_ERROR.into_response();
	}

	([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response()
}

pub fn router() -> Router {
	Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_telemetry_endpoint(addr: SocketAddr) -> Result<()> {
	axum::Server::try_bind(&addr)
		.context(format!("failed to bind telemetry endpoint to {addr}"))?
		.serve(router().into_make_service())
		.await
		.context("telemetry endpoint crashed")?;

	Ok(())
}
