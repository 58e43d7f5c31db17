//! prometheus meters of the notifier, registered once in the default registry

use once_cell::sync::Lazy;
use prometheus::{
	exponential_buckets, histogram_opts, opts, register_histogram_vec, register_int_counter,
	register_int_counter_vec, HistogramVec, IntCounter, IntCounterVec,
};

#[allow(clippy::expect_used)]
static METRICS: Lazy<Metrics> =
	Lazy::new(|| Metrics::new().expect("failed to register prometheus meters"));

#[derive(Debug)]
/// prometheus meters for webhook receiver and channels
pub struct Metrics {
	/// total number of deserialized alerts
	pub received_alerts: IntCounter,
	/// webhook requests by outcome (`dispatched`, `malformed`)
	pub webhook_requests: IntCounterVec,
	/// send attempts by channel and outcome (`delivered`, `failed`)
	pub channel_sends: IntCounterVec,
	/// failed http requests by channel and status code
	pub http_requests_failed: IntCounterVec,
	/// duration of http requests to downstream apis
	pub http_request_duration: HistogramVec,
}

impl Metrics {
	fn new() -> Result<Self, prometheus::Error> {
		let received_alerts = register_int_counter!(opts!(
			"received_alerts_total",
			"total number of deserialized alerts"
		)
		.namespace("alertmanager_notifier")
		.subsystem("webhook"))?;

		let webhook_requests = register_int_counter_vec!(
			opts!("requests_total", "total number of webhook requests")
				.namespace("alertmanager_notifier")
				.subsystem("webhook"),
			&["outcome"]
		)?;

		let channel_sends = register_int_counter_vec!(
			opts!("sends_total", "total number of send attempts")
				.namespace("alertmanager_notifier")
				.subsystem("channel"),
			&["channel", "outcome"]
		)?;

		let http_requests_failed = register_int_counter_vec!(
			opts!("http_requests_failed", "number of failed http requests")
				.namespace("alertmanager_notifier")
				.subsystem("channel"),
			&["channel", "status_code"]
		)?;

		let http_request_duration = register_histogram_vec!(
			histogram_opts!(
				"http_request_duration_seconds",
				"total time of a http request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertmanager_notifier")
			.subsystem("channel"),
			&["channel"]
		)?;

		Ok(Self {
			received_alerts,
			webhook_requests,
			channel_sends,
			http_requests_failed,
			http_request_duration,
		})
	}

	pub fn global() -> &'static Self {
		&METRICS
	}
}
