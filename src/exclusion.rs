//! label based exclusion rules, alerts matching any rule are dropped before rendering
//!
//! Rules are configured as a single string. Two forms are understood:
//!
//! - compact: `severity=info;team=infra,env=staging;muted` (rules separated by
//!   `;`, matchers of one rule separated by `,`, a bare key only checks presence)
//! - json: `{"severity": "info"}` or `[{"severity": "info"}, {"muted": null}]`
//!   (`null` checks presence)
use std::{str::FromStr, sync::Arc};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::alert::{Alert, Data};

/// Error returned if an exclusion rule string can't be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExclusionError {
	#[error("exclusion rule {0} has no matchers")]
	EmptyRule(usize),
	#[error("exclusion rule {0} contains a matcher without label name")]
	EmptyKey(usize),
	#[error("exclusion rules are not valid json: {0}")]
	Json(String),
	#[error("exclusion rule {rule}: value of label `{key}` must be a string or null")]
	InvalidValue { rule: usize, key: String },
	#[error("exclusion rules must be a json object or an array of json objects")]
	NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
	/// label must be present with exactly this value
	Equals { key: String, value: String },
	/// label must be present, value doesn't matter
	Present { key: String },
}

impl Matcher {
	fn matches(&self, alert: &Alert) -> bool {
		match self {
			Matcher::Equals { key, value } => alert.labels.get(key) == Some(value),
			Matcher::Present { key } => alert.labels.contains_key(key),
		}
	}
}

/// a single rule, matches if all of its matchers match
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule(Vec<Matcher>);

impl Rule {
	fn matches(&self, alert: &Alert) -> bool {
		self.0.iter().all(|matcher| matcher.matches(alert))
	}
}

/// Set of exclusion rules, an alert is excluded if it matches any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules(Vec<Rule>);

impl ExclusionRules {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// true if `alert` matches at least one rule
	pub fn excludes(&self, alert: &Alert) -> bool {
		self.0.iter().any(|rule| rule.matches(alert))
	}

	/// Returns a new batch without the excluded alerts. Surviving alerts keep
	/// their relative order and are shared with `batch`.
	pub fn filter(&self, batch: &Data) -> Data {
		if self.is_empty() {
			return batch.clone();
		}

		let alerts: Vec<Arc<Alert>> =
			batch.alerts.iter().filter(|alert| !self.excludes(alert)).cloned().collect();
		let excluded = batch.alerts.len() - alerts.len();

		if excluded > 0 {
			tracing::debug!("excluded {excluded} of {} alert(s)", batch.alerts.len());
		}

		batch.with_alerts(alerts, excluded)
	}

	fn parse_compact(s: &str) -> Result<Self, ExclusionError> {
		let mut rules = Vec::new();

		for (index, rule) in s.split(';').enumerate() {
			let mut matchers = Vec::new();

			for matcher in rule.split(',').map(str::trim).filter(|m| !m.is_empty()) {
				let matcher = match matcher.split_once('=') {
					Some((key, value)) => {
						Matcher::Equals { key: key.trim().to_owned(), value: value.trim().to_owned() }
					}
					None => Matcher::Present { key: matcher.to_owned() },
				};

				let key = match &matcher {
					Matcher::Equals { key, .. } | Matcher::Present { key } => key,
				};
				if key.is_empty() {
					return Err(ExclusionError::EmptyKey(index));
				}

				matchers.push(matcher);
			}

			if matchers.is_empty() {
				return Err(ExclusionError::EmptyRule(index));
			}

			rules.push(Rule(matchers));
		}

		Ok(Self(rules))
	}

	fn parse_json(s: &str) -> Result<Self, ExclusionError> {
		let value: Value =
			serde_json::from_str(s).map_err(|err| ExclusionError::Json(err.to_string()))?;

		let objects = match value {
			Value::Array(values) => values,
			object @ Value::Object(_) => vec![object],
			_ => return Err(ExclusionError::NotAnObject),
		};

		let mut rules = Vec::with_capacity(objects.len());

		for (index, object) in objects.into_iter().enumerate() {
			let Value::Object(object) = object else {
				return Err(ExclusionError::NotAnObject);
			};
			if object.is_empty() {
				return Err(ExclusionError::EmptyRule(index));
			}

			let mut matchers = Vec::with_capacity(object.len());
			for (key, value) in object {
				if key.trim().is_empty() {
					return Err(ExclusionError::EmptyKey(index));
				}

				matchers.push(match value {
					Value::String(value) => Matcher::Equals { key, value },
					Value::Null => Matcher::Present { key },
					_ => return Err(ExclusionError::InvalidValue { rule: index, key }),
				});
			}

			rules.push(Rule(matchers));
		}

		Ok(Self(rules))
	}
}

impl FromStr for ExclusionRules {
	type Err = ExclusionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();

		if s.is_empty() {
			Ok(Self::default())
		} else if s.starts_with('{') || s.starts_with('[') {
			Self::parse_json(s)
		} else {
			Self::parse_compact(s)
		}
	}
}

struct ExclusionRulesVisitor;

impl<'de> serde::de::Visitor<'de> for ExclusionRulesVisitor {
	type Value = ExclusionRules;

	fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
		formatter.write_str("label exclusion rules like `severity=info;team=infra,env=staging` or `{\"severity\": \"info\"}`")
	}

	fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
	where
		E: serde::de::Error,
	{
		v.parse().map_err(E::custom)
	}

	fn visit_none<E>(self) -> Result<Self::Value, E>
	where
		E: serde::de::Error,
	{
		Ok(ExclusionRules::default())
	}

	fn visit_unit<E>(self) -> Result<Self::Value, E>
	where
		E: serde::de::Error,
	{
		Ok(ExclusionRules::default())
	}
}

impl<'de> Deserialize<'de> for ExclusionRules {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		deserializer.deserialize_any(ExclusionRulesVisitor)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn batch(labels: &[Value]) -> Data {
		let alerts: Vec<Value> =
			labels.iter().map(|labels| json!({"status": "firing", "labels": labels})).collect();

		Data::parse(json!({ "alerts": alerts })).unwrap()
	}

	fn names(batch: &Data) -> Vec<&str> {
		batch.alerts.iter().map(|alert| alert.labels["alertname"].as_str()).collect()
	}

	#[test]
	fn empty_string_has_no_rules() {
		assert!("".parse::<ExclusionRules>().unwrap().is_empty());
		assert!("   ".parse::<ExclusionRules>().unwrap().is_empty());
	}

	#[test]
	fn parses_compact_form() {
		let rules: ExclusionRules = "severity=info; team = infra , env=staging;muted".parse().unwrap();

		assert_eq!(rules.len(), 3);
		assert_eq!(
			rules.0[1],
			Rule(vec![
				Matcher::Equals { key: "team".into(), value: "infra".into() },
				Matcher::Equals { key: "env".into(), value: "staging".into() },
			])
		);
		assert_eq!(rules.0[2], Rule(vec![Matcher::Present { key: "muted".into() }]));
	}

	#[test]
	fn parses_json_form() {
		let rules: ExclusionRules = r#"[{"severity": "info"}, {"muted": null}]"#.parse().unwrap();
		assert_eq!(rules.len(), 2);
		assert_eq!(rules.0[1], Rule(vec![Matcher::Present { key: "muted".into() }]));

		let rules: ExclusionRules = r#"{"severity": "info", "team": "infra"}"#.parse().unwrap();
		assert_eq!(rules.len(), 1);
		assert_eq!(rules.0[0].0.len(), 2);
	}

	#[test]
	fn rejects_malformed_rules() {
		assert_eq!("a=b;;c".parse::<ExclusionRules>(), Err(ExclusionError::EmptyRule(1)));
		assert_eq!("=b".parse::<ExclusionRules>(), Err(ExclusionError::EmptyKey(0)));
		assert_eq!("{}".parse::<ExclusionRules>(), Err(ExclusionError::EmptyRule(0)));
		assert_eq!("[1]".parse::<ExclusionRules>(), Err(ExclusionError::NotAnObject));
		assert!(matches!("{\"a\": 1}".parse::<ExclusionRules>(), Err(ExclusionError::InvalidValue { .. })));
		assert!(matches!("{broken".parse::<ExclusionRules>(), Err(ExclusionError::Json(_))));
	}

	#[test]
	fn without_rules_filter_is_identity() {
		let input = batch(&[json!({"alertname": "A"}), json!({"alertname": "B"})]);
		let output = ExclusionRules::default().filter(&input);

		assert_eq!(names(&output), ["A", "B"]);
		assert_eq!(output.excluded_alerts, 0);
	}

	#[test]
	fn excludes_alert_matching_rule() {
		let rules: ExclusionRules = r#"{"severity":"info"}"#.parse().unwrap();
		let input = batch(&[
			json!({"alertname": "Noise", "severity": "info"}),
			json!({"alertname": "Down", "severity": "critical"}),
		]);

		let output = rules.filter(&input);

		assert_eq!(names(&output), ["Down"]);
		assert_eq!(output.excluded_alerts, 1);
		assert!(Arc::ptr_eq(&output.alerts[0], &input.alerts[1]));
	}

	#[test]
	fn and_within_rule_or_across_rules() {
		let rules: ExclusionRules = "team=infra,env=staging;muted".parse().unwrap();
		let input = batch(&[
			json!({"alertname": "A", "team": "infra", "env": "staging"}),
			json!({"alertname": "B", "team": "infra", "env": "prod"}),
			json!({"alertname": "C", "muted": "whatever"}),
			json!({"alertname": "D", "env": "staging"}),
		]);

		assert_eq!(names(&rules.filter(&input)), ["B", "D"]);
	}

	#[test]
	fn filter_is_idempotent_and_order_preserving() {
		let rules: ExclusionRules = "severity=info".parse().unwrap();
		let input = batch(&[
			json!({"alertname": "A"}),
			json!({"alertname": "B", "severity": "info"}),
			json!({"alertname": "C"}),
			json!({"alertname": "D", "severity": "info"}),
			json!({"alertname": "E"}),
		]);

		let once = rules.filter(&input);
		let twice = rules.filter(&once);

		assert_eq!(names(&once), ["A", "C", "E"]);
		assert_eq!(names(&once), names(&twice));
		assert_eq!(twice.excluded_alerts, 2);
	}

	#[test]
	fn excluding_everything_leaves_empty_batch() {
		let rules: ExclusionRules = "alertname".parse().unwrap();
		let output = rules.filter(&batch(&[json!({"alertname": "A"})]));

		assert!(output.alerts.is_empty());
		assert_eq!(output.excluded_alerts, 1);
	}

	#[test]
	fn deserializes_from_string_or_null() {
		#[derive(Deserialize)]
		struct Wrapper {
			rules: ExclusionRules,
		}

		let wrapper: Wrapper = serde_json::from_value(json!({ "rules": "severity=info" })).unwrap();
		assert_eq!(wrapper.rules.len(), 1);

		let wrapper: Wrapper = serde_json::from_value(json!({ "rules": null })).unwrap();
		assert!(wrapper.rules.is_empty());

		assert!(serde_json::from_value::<Wrapper>(json!({ "rules": "=x" })).is_err());
	}
}
