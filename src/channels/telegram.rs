//! telegram bot api channel

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::{Channel, ChannelId, HttpClient, SendError};

/// maximum length of a `sendMessage` text in utf-16 code units after entity parsing
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// the configured bot token is malformed
#[derive(Error, Debug)]
#[error("invalid telegram token: expected `<bot id>:<secret>` without whitespace")]
pub struct InvalidToken;

#[derive(Serialize)]
struct SendMessage<'a> {
	chat_id: &'a str,
	text: &'a str,
	parse_mode: &'static str,
	disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
	ok: bool,
	#[serde(default)]
	description: Option<String>,
}

/// Sends messages with a bot to a single chat
pub struct TelegramChannel {
	http: HttpClient,
	/// `sendMessage` url, contains the token
	endpoint: Url,
	chat_id: String,
}

/// `<numeric bot id>:<secret>`, the format the bot api hands out
fn is_valid_token(token: &str) -> bool {
	if token.chars().any(char::is_whitespace) {
		return false;
	}

	match token.split_once(':') {
		Some((id, secret)) => {
			!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
		}
		None => false,
	}
}

impl TelegramChannel {
	/// Construct channel, fails if `token` is malformed. The token isn't
	/// verified against the api.
	///
	/// # Arguments
	///
	/// * `api_url` - base url of the bot api, e.g. `https://api.telegram.org`
	///
	/// * `token` - bot token
	///
	/// * `chat_id` - numeric chat id or `@channelusername`
	pub fn new(
		http: HttpClient,
		api_url: &Url,
		token: &str,
		chat_id: impl Into<String>,
	) -> Result<Self, InvalidToken> {
		if !is_valid_token(token) {
			return Err(InvalidToken);
		}

		let endpoint = format!("{}/bot{token}/sendMessage", api_url.as_str().trim_end_matches('/'));
		let endpoint = Url::parse(&endpoint).map_err(|_| InvalidToken)?;

		Ok(Self { http, endpoint, chat_id: chat_id.into() })
	}
}

#[async_trait]
impl Channel for TelegramChannel {
	fn id(&self) -> ChannelId {
		ChannelId::Telegram
	}

	fn max_message_length(&self) -> Option<usize> {
		Some(MAX_MESSAGE_LENGTH)
	}

	async fn send(&self, text: &str) -> Result<(), SendError> {
		let body = SendMessage {
			chat_id: &self.chat_id,
			text,
			parse_mode: "HTML",
			disable_web_page_preview: true,
		};

		let request = self.http.post(self.endpoint.clone()).json(&body);
		let response = self.http.execute(ChannelId::Telegram, request).await?;

		let status = response.status();
		let api_response = response.json::<ApiResponse>().await.ok();

		if status.is_success() && api_response.as_ref().map_or(false, |response| response.ok) {
			tracing::debug!("telegram message sent to chat {}", self.chat_id);
			return Ok(());
		}

		let description = api_response
			.and_then(|response| response.description)
			.unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());

		match status {
			StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
				Err(SendError::Unauthorized { status: status.as_u16(), description })
			}
			_ => Err(SendError::Rejected { status: status.as_u16(), description }),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;
	use wiremock::{
		matchers::{body_partial_json, method, path},
		Mock, MockServer, ResponseTemplate,
	};

	use super::*;

	const TOKEN: &str = "123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11";

	async fn channel(server: &MockServer) -> TelegramChannel {
		let http = HttpClient::new(Duration::from_millis(500)).unwrap();
		let api_url = Url::parse(&server.uri()).unwrap();

		TelegramChannel::new(http, &api_url, TOKEN, "-1001").unwrap()
	}

	#[test]
	fn validates_token_format() {
		assert!(is_valid_token(TOKEN));
		assert!(!is_valid_token(""));
		assert!(!is_valid_token("no-colon"));
		assert!(!is_valid_token("abc:secret"));
		assert!(!is_valid_token("123:"));
		assert!(!is_valid_token(":secret"));
		assert!(!is_valid_token("123:sec ret"));
	}

	#[test]
	fn invalid_token_fails_construction() {
		let http = HttpClient::new(Duration::from_secs(1)).unwrap();
		let api_url = Url::parse("https://api.telegram.org").unwrap();

		assert!(TelegramChannel::new(http, &api_url, "not a token", "1").is_err());
	}

	#[tokio::test]
	async fn sends_html_message_to_chat() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path(format!("/bot{TOKEN}/sendMessage")))
			.and(body_partial_json(json!({
				"chat_id": "-1001",
				"text": "<b>hello</b>",
				"parse_mode": "HTML"
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
			.expect(1)
			.mount(&server)
			.await;

		let result = channel(&server).await.send("<b>hello</b>").await;

		assert!(result.is_ok(), "{result:?}");
	}

	#[tokio::test]
	async fn api_rejection_is_permanent() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"ok": false,
				"error_code": 400,
				"description": "Bad Request: chat not found"
			})))
			.mount(&server)
			.await;

		let err = channel(&server).await.send("hello").await.unwrap_err();

		assert!(
			matches!(&err, SendError::Rejected { status: 400, description } if description == "Bad Request: chat not found")
		);
		assert!(!err.is_transient());
	}

	#[tokio::test]
	async fn unauthorized_token() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(401).set_body_json(json!({
				"ok": false,
				"error_code": 401,
				"description": "Unauthorized"
			})))
			.mount(&server)
			.await;

		let err = channel(&server).await.send("hello").await.unwrap_err();

		assert!(matches!(err, SendError::Unauthorized { status: 401, .. }));
	}

	#[tokio::test]
	async fn server_error_is_transient() {
		let server = MockServer::start().await;

		Mock::given(method("POST")).respond_with(ResponseTemplate::new(502)).mount(&server).await;

		let err = channel(&server).await.send("hello").await.unwrap_err();

		assert!(matches!(err, SendError::Rejected { status: 502, .. }));
		assert!(err.is_transient());
	}

	#[tokio::test]
	async fn slow_api_times_out() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({"ok": true}))
					.set_delay(Duration::from_secs(2)),
			)
			.mount(&server)
			.await;

		let err = channel(&server).await.send("hello").await.unwrap_err();

		assert!(matches!(err, SendError::Timeout));
	}
}
