use std::{
	net::{IpAddr, Ipv4Addr, SocketAddr},
	path::PathBuf,
	time::Duration,
};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::{Config, Source, Value, ValueKind};
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::exclusion::ExclusionRules;

/// Settings of the notifier. Keys are the lowercased environment variable
/// names, so `TELEGRAM_TOKEN` sets `telegram_token`. Empty values count as
/// unset and leave the default in place.
#[serde_as]
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub telegram_token: Option<String>,
	pub telegram_chat_id: Option<String>,
	/// yes/no style toggle, see [parse_toggle]
	pub telegram_retry_on_failure: String,
	pub telegram_api_url: String,
	pub telegram_template: String,
	pub telegram_template_too_long: String,

	pub gotify_url: Option<String>,
	pub gotify_token: Option<String>,
	pub gotify_title: String,
	pub gotify_priority: i64,
	pub gotify_template: String,

	pub null_template: String,
	/// directory searched for templates before falling back to the builtin ones
	pub template_dir: PathBuf,
	pub exclude_labels: ExclusionRules,
	/// fractional seconds, must not be zero
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	pub send_timeout: Duration,

	/// listen address of the webhook receiver, `*` for all interfaces
	pub address: String,
	pub port: u16,
	/// port of the prometheus telemetry endpoint, disabled if unset
	pub metrics_port: Option<u16>,
	pub log_level: String,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			telegram_token: None,
			telegram_chat_id: None,
			telegram_retry_on_failure: "yes".to_owned(),
			telegram_api_url: "https://api.telegram.org".to_owned(),
			telegram_template: "html.j2".to_owned(),
			telegram_template_too_long: "too_long.html.j2".to_owned(),
			gotify_url: None,
			gotify_token: None,
			gotify_title: "Alertmanager".to_owned(),
			gotify_priority: 5,
			gotify_template: "markdown.md.j2".to_owned(),
			null_template: "text.j2".to_owned(),
			template_dir: PathBuf::from("templates"),
			exclude_labels: ExclusionRules::default(),
			send_timeout: Duration::from_secs(10),
			address: "*".to_owned(),
			port: 8899,
			metrics_port: None,
			log_level: "info".to_owned(),
		}
	}
}

fn is_blank(value: &Value) -> bool {
	matches!(&value.kind, ValueKind::String(value) if value.trim().is_empty())
}

/// an empty environment variable counts as unset
fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

impl Settings {
	/// Parse command line arguments and load settings from the optional
	/// config file and the environment (environment wins).
	pub fn load() -> Result<Self> {
		let opts = Command::new(clap::crate_name!())
			.version(clap::crate_version!())
			.about(clap::crate_description!())
			.author(clap::crate_authors!())
			.args([
				Arg::new("config")
					.help("path of optional config file, environment variables take precedence")
					.takes_value(true)
					.short('c')
					.long("config"),
				Arg::new("level")
					.help("log level")
					.possible_values(["error", "warn", "info", "debug", "trace"])
					.ignore_case(true)
					.takes_value(true)
					.long("log"),
			])
			.get_matches();

		let mut conf = Config::builder();
		if let Some(config_path) = opts.value_of("config") {
			conf = conf.add_source(config::File::with_name(config_path));
		}
		let conf = conf.add_source(config::Environment::default()).build().context("can't load config")?;

		let mut settings = Self::from_config(conf)?;

		if let Some(level) = opts.value_of("level") {
			settings.log_level = level.to_string();
		}

		Ok(settings)
	}

	/// deserialize settings from an already built [Config]
	pub fn from_config(conf: Config) -> Result<Self> {
		let mut values = conf.collect().context("can't load config")?;
		values.retain(|_, value| !is_blank(value));

		let settings: Self =
			Value::new(None, ValueKind::Table(values)).try_deserialize().context("can't load config")?;

		anyhow::ensure!(!settings.send_timeout.is_zero(), "send_timeout must be greater than zero");

		Ok(settings)
	}

	/// token and chat id, if both are configured
	pub fn telegram(&self) -> Option<(&str, &str)> {
		non_empty(&self.telegram_token).zip(non_empty(&self.telegram_chat_id))
	}

	/// url and application token, if both are configured
	pub fn gotify(&self) -> Option<(&str, &str)> {
		non_empty(&self.gotify_url).zip(non_empty(&self.gotify_token))
	}

	pub fn telegram_retry_on_failure(&self) -> Toggle {
		parse_toggle(&self.telegram_retry_on_failure, true)
	}

	pub fn listen_addr(&self) -> Result<SocketAddr> {
		Ok(SocketAddr::new(self.bind_address()?, self.port))
	}

	pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
		let ip = self.bind_address()?;
		Ok(self.metrics_port.map(|port| SocketAddr::new(ip, port)))
	}

	fn bind_address(&self) -> Result<IpAddr> {
		match self.address.trim() {
			"*" | "" => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
			address => address.parse().context(format!("invalid listen address `{address}`")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// result of parsing a yes/no style setting
pub enum Toggle {
	/// the value was understood
	Explicit(bool),
	/// the value wasn't understood, the fallback applies and the caller should warn
	Ambiguous { fallback: bool },
}

impl Toggle {
	pub fn value(self) -> bool {
		match self {
			Toggle::Explicit(value) => value,
			Toggle::Ambiguous { fallback } => fallback,
		}
	}
}

/// Parse `y`/`yes`/`t`/`true`/`on`/`1` and `n`/`no`/`f`/`false`/`off`/`0`
/// (case insensitive). Anything else is [Toggle::Ambiguous].
pub fn parse_toggle(raw: &str, fallback: bool) -> Toggle {
	match raw.trim().to_ascii_lowercase().as_str() {
		"y" | "yes" | "t" | "true" | "on" | "1" => Toggle::Explicit(true),
		"n" | "no" | "f" | "false" | "off" | "0" => Toggle::Explicit(false),
		_ => Toggle::Ambiguous { fallback },
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn settings(overrides: &[(&str, &str)]) -> Result<Settings> {
		let mut builder = Config::builder();
		for (key, value) in overrides {
			builder = builder.set_override(*key, *value)?;
		}

		Settings::from_config(builder.build()?)
	}

	#[test]
	fn defaults() {
		let settings = settings(&[]).unwrap();

		assert_eq!(settings.port, 8899);
		assert_eq!(settings.telegram_template, "html.j2");
		assert_eq!(settings.telegram_template_too_long, "too_long.html.j2");
		assert_eq!(settings.gotify_template, "markdown.md.j2");
		assert_eq!(settings.null_template, "text.j2");
		assert_eq!(settings.send_timeout, Duration::from_secs(10));
		assert!(settings.telegram().is_none());
		assert!(settings.gotify().is_none());
		assert!(settings.exclude_labels.is_empty());
		assert_eq!(settings.telegram_retry_on_failure(), Toggle::Explicit(true));
		assert_eq!(settings.listen_addr().unwrap(), "0.0.0.0:8899".parse().unwrap());
		assert_eq!(settings.metrics_addr().unwrap(), None);
	}

	#[test]
	fn reads_string_values() {
		let settings = settings(&[
			("telegram_token", "123:abc"),
			("telegram_chat_id", "-100"),
			("telegram_retry_on_failure", "No"),
			("gotify_url", "https://gotify.example"),
			("gotify_token", "token"),
			("port", "9000"),
			("address", "127.0.0.1"),
			("metrics_port", "9100"),
			("send_timeout", "2.5"),
			("exclude_labels", "severity=info"),
		])
		.unwrap();

		assert_eq!(settings.telegram(), Some(("123:abc", "-100")));
		assert_eq!(settings.gotify(), Some(("https://gotify.example", "token")));
		assert_eq!(settings.telegram_retry_on_failure(), Toggle::Explicit(false));
		assert_eq!(settings.listen_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
		assert_eq!(settings.metrics_addr().unwrap(), Some("127.0.0.1:9100".parse().unwrap()));
		assert_eq!(settings.send_timeout, Duration::from_millis(2500));
		assert_eq!(settings.exclude_labels.len(), 1);
	}

	#[test]
	fn fractional_send_timeout() {
		let settings = settings(&[("send_timeout", "0.4")]).unwrap();

		assert_eq!(settings.send_timeout, Duration::from_millis(400));
	}

	#[test]
	fn zero_send_timeout_is_error() {
		assert!(settings(&[("send_timeout", "0")]).is_err());
		assert!(settings(&[("send_timeout", "0.0000000001")]).is_err());
		assert!(settings(&[("send_timeout", "-1")]).is_err());
	}

	#[test]
	fn empty_values_keep_defaults() {
		let settings = settings(&[
			("metrics_port", ""),
			("port", ""),
			("send_timeout", ""),
			("gotify_priority", " "),
			("address", ""),
			("telegram_template", ""),
		])
		.unwrap();

		assert_eq!(settings.metrics_port, None);
		assert_eq!(settings.port, 8899);
		assert_eq!(settings.send_timeout, Duration::from_secs(10));
		assert_eq!(settings.gotify_priority, 5);
		assert_eq!(settings.address, "*");
		assert_eq!(settings.telegram_template, "html.j2");
	}

	#[test]
	fn empty_environment_variables_keep_defaults() {
		let environment = [("METRICS_PORT", ""), ("PORT", ""), ("SEND_TIMEOUT", ""), ("GOTIFY_PRIORITY", "")]
			.into_iter()
			.map(|(key, value)| (key.to_owned(), value.to_owned()))
			.collect();

		let conf = Config::builder()
			.add_source(config::Environment::default().source(Some(environment)))
			.build()
			.unwrap();
		let settings = Settings::from_config(conf).unwrap();

		assert_eq!(settings.metrics_port, None);
		assert_eq!(settings.port, 8899);
		assert_eq!(settings.send_timeout, Duration::from_secs(10));
		assert_eq!(settings.gotify_priority, 5);
	}

	#[test]
	fn empty_credentials_disable_channel() {
		let settings = settings(&[("telegram_token", "123:abc"), ("telegram_chat_id", " ")]).unwrap();

		assert!(settings.telegram().is_none());
	}

	#[test]
	fn invalid_exclusion_rules_fail_loading() {
		assert!(settings(&[("exclude_labels", "=info")]).is_err());
	}

	#[test]
	fn invalid_address_is_error() {
		let settings = settings(&[("address", "localhost:80")]).unwrap();

		assert!(settings.listen_addr().is_err());
	}

	#[test]
	fn toggle_parsing() {
		for raw in ["y", "YES", "true", "On", "1", " t "] {
			assert_eq!(parse_toggle(raw, false), Toggle::Explicit(true), "{raw}");
		}
		for raw in ["n", "No", "FALSE", "off", "0", "f"] {
			assert_eq!(parse_toggle(raw, true), Toggle::Explicit(false), "{raw}");
		}

		let ambiguous = parse_toggle("maybe", true);
		assert_eq!(ambiguous, Toggle::Ambiguous { fallback: true });
		assert!(ambiguous.value());
	}
}
