//! gotify push notification channel

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{Channel, ChannelId, HttpClient, SendError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
	#[serde(default)]
	error_description: Option<String>,
}

/// Pushes messages to a gotify application
pub struct GotifyChannel {
	http: HttpClient,
	/// `/message` url of the gotify server
	endpoint: Url,
	/// application token
	token: String,
	title: String,
	priority: i64,
}

impl GotifyChannel {
	/// Construct channel
	///
	/// # Arguments
	///
	/// * `url` - base url of the gotify server
	///
	/// * `token` - application token
	///
	/// * `title` - title of every pushed message
	///
	/// * `priority` - gotify priority of every pushed message
	pub fn new(
		http: HttpClient,
		url: &Url,
		token: impl Into<String>,
		title: impl Into<String>,
		priority: i64,
	) -> Result<Self, url::ParseError> {
		let endpoint = Url::parse(&format!("{}/message", url.as_str().trim_end_matches('/')))?;

		Ok(Self { http, endpoint, token: token.into(), title: title.into(), priority })
	}
}

#[async_trait]
impl Channel for GotifyChannel {
	fn id(&self) -> ChannelId {
		ChannelId::Gotify
	}

	async fn send(&self, text: &str) -> Result<(), SendError> {
		let body = json!({
			"title": self.title,
			"message": text,
			"priority": self.priority,
			"extras": {
				"client::display": { "contentType": "text/markdown" }
			}
		});

		let request =
			self.http.post(self.endpoint.clone()).header("X-Gotify-Key", &self.token).json(&body);
		let response = self.http.execute(ChannelId::Gotify, request).await?;

		let status = response.status();
		if status.is_success() {
			tracing::debug!("gotify message pushed");
			return Ok(());
		}

		let description = response
			.json::<ErrorResponse>()
			.await
			.ok()
			.and_then(|response| response.error_description)
			.unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());

		match status {
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				Err(SendError::Unauthorized { status: status.as_u16(), description })
			}
			_ => Err(SendError::Rejected { status: status.as_u16(), description }),
		}
	}
}
