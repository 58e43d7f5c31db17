//! Downstream messaging channels. Every channel takes a rendered text and
//! delivers it to one external api.

pub mod gotify;
pub mod http_client;
pub mod null;
pub mod telegram;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use self::{gotify::GotifyChannel, http_client::HttpClient, null::NullChannel, telegram::TelegramChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// identity of a channel, used in results, logs and metrics
pub enum ChannelId {
	Telegram,
	Gotify,
	Null,
}

impl ChannelId {
	pub fn as_str(&self) -> &'static str {
		match self {
			ChannelId::Telegram => "telegram",
			ChannelId::Gotify => "gotify",
			ChannelId::Null => "null",
		}
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned by [Channel::send]
#[derive(Error, Debug)]
pub enum SendError {
	/// no response within the configured send timeout
	#[error("request timed out")]
	Timeout,
	/// connection or protocol error, the url is stripped since it may contain credentials
	#[error("request failed: {0}")]
	Transport(#[source] reqwest::Error),
	/// the api rejected our credentials
	#[error("unauthorized (status {status}): {description}")]
	Unauthorized { status: u16, description: String },
	/// the api refused to deliver the message
	#[error("rejected (status {status}): {description}")]
	Rejected { status: u16, description: String },
}

impl SendError {
	/// true if sending the same message again might succeed
	pub fn is_transient(&self) -> bool {
		match self {
			SendError::Timeout | SendError::Transport(_) => true,
			SendError::Unauthorized { .. } => false,
			SendError::Rejected { status, .. } => *status == 429 || *status >= 500,
		}
	}
}

impl From<reqwest::Error> for SendError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			SendError::Timeout
		} else {
			SendError::Transport(err.without_url())
		}
	}
}

/// Capability to deliver a rendered message to one downstream api
#[async_trait]
pub trait Channel: Send + Sync {
	fn id(&self) -> ChannelId;

	/// maximum message length in utf-16 code units, `None` if the api has no limit
	fn max_message_length(&self) -> Option<usize> {
		None
	}

	/// deliver `text`
	async fn send(&self, text: &str) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transient_errors() {
		assert!(SendError::Timeout.is_transient());
		assert!(SendError::Rejected { status: 502, description: String::new() }.is_transient());
		assert!(SendError::Rejected { status: 429, description: String::new() }.is_transient());
		assert!(!SendError::Rejected { status: 400, description: String::new() }.is_transient());
		assert!(!SendError::Unauthorized { status: 401, description: String::new() }.is_transient());
	}

	#[test]
	fn channel_ids_display_lowercase() {
		assert_eq!(ChannelId::Telegram.to_string(), "telegram");
		assert_eq!(ChannelId::Gotify.to_string(), "gotify");
		assert_eq!(ChannelId::Null.to_string(), "null");
	}
}
