use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use url::Url;

use super::{ChannelId, SendError};
use crate::metrics::Metrics;

#[derive(Debug, Clone)]
/// http client shared by all channels, enforces the send timeout and records request metrics
pub struct HttpClient {
	client: reqwest::Client,
}

impl HttpClient {
	/// construct client
	///
	/// * `timeout` - per request timeout, expiry is reported as [SendError::Timeout]
	pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self { client })
	}

	pub fn post(&self, url: Url) -> RequestBuilder {
		self.client.post(url)
	}

	/// Execute a request built with [HttpClient::post]. Only transport
	/// failures are errors here, the caller interprets the status code.
	pub async fn execute(
		&self,
		channel: ChannelId,
		request: RequestBuilder,
	) -> Result<Response, SendError> {
		let metrics = Metrics::global();

		let _timer =
			metrics.http_request_duration.with_label_values(&[channel.as_str()]).start_timer();

		let response = match request.send().await {
			Ok(response) => response,
			Err(err) => {
				metrics.http_requests_failed.with_label_values(&[channel.as_str(), ""]).inc();
				return Err(err.into());
			}
		};

		if !response.status().is_success() {
			metrics
				.http_requests_failed
				.with_label_values(&[channel.as_str(), response.status().as_str()])
				.inc();
		}

		Ok(response)
	}
}
