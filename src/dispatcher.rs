//! The [Dispatcher] runs one notify cycle per webhook request: filter the
//! batch, render it for every configured channel, send it, retry once where
//! configured and aggregate the outcomes into a single [NotifyResponse].
//!
//! Channels are independent of each other. A failing channel never prevents
//! the others from being tried, and the request only counts as failed if no
//! channel delivered.

use std::fmt;

use futures::future::join_all;
use thiserror::Error;
use url::Url;

use crate::{
	alert,
	alert_renderer::{AlertRenderer, ChannelTemplates, RenderError, TemplateError},
	channels::{
		telegram::InvalidToken, Channel, ChannelId, GotifyChannel, HttpClient, NullChannel, SendError,
		TelegramChannel,
	},
	exclusion::ExclusionRules,
	metrics::Metrics,
	settings::{Settings, Toggle},
};

/// Error preventing the notifier from starting
#[derive(Error, Debug)]
pub enum StartupError {
	#[error(transparent)]
	Template(#[from] TemplateError),
	#[error(transparent)]
	InvalidCredential(#[from] InvalidToken),
	#[error("invalid {channel} url `{url}`: {reason}")]
	InvalidUrl { channel: ChannelId, url: String, reason: url::ParseError },
	#[error("failed to construct http client: {0}")]
	HttpClient(#[from] reqwest::Error),
}

/// Reason a channel couldn't deliver a batch
#[derive(Error, Debug)]
pub enum NotifyError {
	#[error(transparent)]
	Render(#[from] RenderError),
	#[error("message length {length} exceeds the limit of {limit} even with the fallback template")]
	MessageTooLong { length: usize, limit: usize },
	#[error(transparent)]
	Send(#[from] SendError),
}

impl NotifyError {
	/// only transient send failures are worth a second attempt
	pub fn is_retryable(&self) -> bool {
		match self {
			NotifyError::Send(err) => err.is_transient(),
			NotifyError::Render(_) | NotifyError::MessageTooLong { .. } => false,
		}
	}
}

/// a channel together with its templates and retry policy
pub struct Target {
	channel: Box<dyn Channel>,
	templates: ChannelTemplates,
	retry_on_failure: bool,
}

impl Target {
	pub fn new(channel: impl Channel + 'static, templates: ChannelTemplates) -> Self {
		Self { channel: Box::new(channel), templates, retry_on_failure: false }
	}

	/// retry a transient send failure once
	pub fn with_retry(mut self, retry_on_failure: bool) -> Self {
		self.retry_on_failure = retry_on_failure;
		self
	}

	pub fn id(&self) -> ChannelId {
		self.channel.id()
	}

	pub fn templates(&self) -> &ChannelTemplates {
		&self.templates
	}

	fn max_attempts(&self) -> u32 {
		if self.retry_on_failure {
			2
		} else {
			1
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// outcome of one channel in one notify cycle
pub struct NotifyResult {
	pub channel: ChannelId,
	pub ok: bool,
	/// error description, empty on success
	pub detail: String,
	/// number of send attempts, 0 if rendering failed
	pub attempts: u32,
}

impl fmt::Display for NotifyResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.ok, self.attempts) {
			(true, 1) => write!(f, "{}: delivered", self.channel),
			(true, attempts) => write!(f, "{}: delivered after {attempts} attempts", self.channel),
			(false, 0) => write!(f, "{}: failed: {}", self.channel, self.detail),
			(false, attempts) => {
				write!(f, "{}: failed after {attempts} attempt(s): {}", self.channel, self.detail)
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// aggregated outcome of one notify cycle, one result per configured channel
pub struct NotifyResponse {
	pub results: Vec<NotifyResult>,
}

impl NotifyResponse {
	/// true if at least one channel delivered
	pub fn is_success(&self) -> bool {
		self.results.iter().any(|result| result.ok)
	}

	pub fn result(&self, channel: ChannelId) -> Option<&NotifyResult> {
		self.results.iter().find(|result| result.channel == channel)
	}
}

impl fmt::Display for NotifyResponse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, result) in self.results.iter().enumerate() {
			if index > 0 {
				writeln!(f)?;
			}
			write!(f, "{result}")?;
		}

		Ok(())
	}
}

/// Owns the configured channels and drives the notify cycle.
pub struct Dispatcher {
	rules: ExclusionRules,
	renderer: AlertRenderer,
	targets: Vec<Target>,
}

impl Dispatcher {
	/// Construct dispatcher. `renderer` must contain every template used by `targets`.
	pub fn new(rules: ExclusionRules, renderer: AlertRenderer, targets: Vec<Target>) -> Self {
		Self { rules, renderer, targets }
	}

	/// Build channels and compile templates from the settings. Telegram comes
	/// first, then gotify. Without any configured channel the null channel is used.
	pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
		let http = HttpClient::new(settings.send_timeout)?;
		let mut targets = Vec::new();

		if let Some((token, chat_id)) = settings.telegram() {
			let api_url = Url::parse(&settings.telegram_api_url).map_err(|reason| {
				StartupError::InvalidUrl {
					channel: ChannelId::Telegram,
					url: settings.telegram_api_url.clone(),
					reason,
				}
			})?;

			let retry_on_failure = match settings.telegram_retry_on_failure() {
				Toggle::Explicit(value) => value,
				Toggle::Ambiguous { fallback } => {
					tracing::warn!(
						"`{}` not understood for TELEGRAM_RETRY_ON_FAILURE. Setting to {fallback}.",
						settings.telegram_retry_on_failure
					);
					fallback
				}
			};

			let channel = TelegramChannel::new(http.clone(), &api_url, token, chat_id)?;
			let templates = ChannelTemplates::new(&settings.telegram_template)
				.with_too_long(&settings.telegram_template_too_long);

			targets.push(Target::new(channel, templates).with_retry(retry_on_failure));
		}

		if let Some((url, token)) = settings.gotify() {
			let invalid_url = |reason| StartupError::InvalidUrl {
				channel: ChannelId::Gotify,
				url: url.to_owned(),
				reason,
			};

			let url = Url::parse(url).map_err(invalid_url)?;
			let channel = GotifyChannel::new(
				http.clone(),
				&url,
				token,
				&settings.gotify_title,
				settings.gotify_priority,
			)
			.map_err(invalid_url)?;

			targets.push(Target::new(channel, ChannelTemplates::new(&settings.gotify_template)));
		}

		if targets.is_empty() {
			tracing::warn!("No notifier configured. Using `null`");
			targets.push(Target::new(NullChannel, ChannelTemplates::new(&settings.null_template)));
		}

		let template_dir = Some(settings.template_dir.as_path()).filter(|dir| dir.is_dir());
		let renderer = AlertRenderer::load(template_dir, targets.iter().map(Target::templates))?;

		let channels: Vec<_> = targets.iter().map(|target| target.id().as_str()).collect();
		tracing::info!(
			"notifying {} with {} exclusion rule(s)",
			channels.join(", "),
			settings.exclude_labels.len()
		);

		Ok(Self::new(settings.exclude_labels.clone(), renderer, targets))
	}

	/// ids of the configured channels in dispatch order
	pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
		self.targets.iter().map(Target::id)
	}

	/// Run one notify cycle for `batch`. All channels are tried concurrently and
	/// the returned response contains one result per channel in configuration order.
	pub async fn notify(&self, batch: alert::Data) -> NotifyResponse {
		let batch = self.rules.filter(&batch);

		tracing::debug!(
			alerts = batch.alerts.len(),
			excluded = batch.excluded_alerts,
			"dispatching batch to {} channel(s)",
			self.targets.len()
		);

		let results = join_all(self.targets.iter().map(|target| self.deliver(target, &batch))).await;
		let response = NotifyResponse { results };

		if !response.is_success() {
			tracing::error!(alerts = batch.alerts.len(), "no channel delivered the notification");
		}

		response
	}

	/// render and send `batch` via a single channel, retrying once if configured
	async fn deliver(&self, target: &Target, batch: &alert::Data) -> NotifyResult {
		let channel = target.id();
		let metrics = Metrics::global();
		let mut attempts = 0;

		let message = match self.renderer.render_message(
			batch,
			&target.templates,
			target.channel.max_message_length(),
		) {
			Ok(message) => Ok(message),
			Err(err) => {
				tracing::error!(%channel, alerts = batch.alerts.len(), "{err}");
				Err(err)
			}
		};

		let outcome = match message {
			Err(err) => Err(err),
			Ok(message) => loop {
				attempts += 1;

				let err = match target.channel.send(&message.text).await {
					Ok(()) => {
						metrics.channel_sends.with_label_values(&[channel.as_str(), "delivered"]).inc();
						break Ok(());
					}
					Err(err) => NotifyError::from(err),
				};

				metrics.channel_sends.with_label_values(&[channel.as_str(), "failed"]).inc();

				if attempts < target.max_attempts() && err.is_retryable() {
					tracing::warn!(
						%channel,
						attempt = attempts,
						alerts = batch.alerts.len(),
						"send failed, retrying: {err}"
					);
					continue;
				}

				tracing::error!(
					%channel,
					attempt = attempts,
					alerts = batch.alerts.len(),
					"send failed: {err}"
				);
				break Err(err);
			},
		};

		match outcome {
			Ok(()) => NotifyResult { channel, ok: true, detail: String::new(), attempts },
			Err(err) => NotifyResult { channel, ok: false, detail: err.to_string(), attempts },
		}
	}
}
