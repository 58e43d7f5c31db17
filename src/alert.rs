//! data structures for deserializing incoming alertmanager webhook payloads
use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// label or annotation set of an alert, ordered so templates render deterministically
pub type LabelSet = BTreeMap<String, String>;

/// Error returned by [Data::parse] if the webhook body isn't an alertmanager payload
#[derive(Error, Debug)]
pub enum MalformedPayload {
	/// top level json value isn't an object
	#[error("payload is not a json object")]
	NotAnObject,
	/// the mandatory `alerts` key is missing
	#[error("payload has no `alerts` key")]
	MissingAlerts,
	/// a known key has the wrong type or an alert lacks `status`/`labels`
	#[error("invalid payload: {0}")]
	Invalid(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
/// state of an alert or of a whole batch
pub enum Status {
	Firing,
	Resolved,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Firing => "firing",
			Status::Resolved => "resolved",
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// data from prometheus received by the alertmanager webhook receiver
///
/// Constructed once per request by [Data::parse] and never mutated afterwards.
/// Alerts are reference counted so a filtered batch shares them with its source.
pub struct Data {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub group_key: String,
	#[serde(default)]
	pub truncated_alerts: u64,

	#[serde(default)]
	pub receiver: String,
	#[serde(default)]
	status: Option<Status>,
	pub alerts: Vec<Arc<Alert>>,
	#[serde(default)]
	pub group_labels: LabelSet,
	#[serde(default)]
	pub common_labels: LabelSet,
	#[serde(default)]
	pub common_annotations: LabelSet,
	#[serde(default, rename = "externalURL")]
	pub external_url: String,

	/// number of alerts removed by the label filter, never read from the payload
	#[serde(default, skip_deserializing)]
	pub excluded_alerts: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// a single alert of a [Data] batch
pub struct Alert {
	pub status: Status,
	pub labels: LabelSet,
	#[serde(default)]
	pub annotations: LabelSet,
	#[serde(default)]
	pub starts_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde(default, rename = "generatorURL")]
	pub generator_url: String,
	#[serde(default)]
	pub fingerprint: Option<String>,
}

impl Data {
	/// Parse an untyped webhook body into a [Data] batch.
	///
	/// Unknown keys are ignored and an empty `alerts` list is accepted. If the
	/// payload carries no batch status it is derived from the alerts.
	pub fn parse(raw: Value) -> Result<Self, MalformedPayload> {
		let object = raw.as_object().ok_or(MalformedPayload::NotAnObject)?;
		if !object.contains_key("alerts") {
			return Err(MalformedPayload::MissingAlerts);
		}

		let mut data: Data = serde_json::from_value(raw)?;
		data.status = Some(data.status());

		Ok(data)
	}

	/// status of the batch: the payload's status or, if absent, firing as long as one alert fires
	pub fn status(&self) -> Status {
		self.status.unwrap_or_else(|| {
			if self.alerts.iter().any(|alert| alert.status == Status::Firing) {
				Status::Firing
			} else {
				Status::Resolved
			}
		})
	}

	/// Construct a batch with the same metadata but a different alert list.
	pub fn with_alerts(&self, alerts: Vec<Arc<Alert>>, excluded: usize) -> Self {
		Self {
			version: self.version.clone(),
			group_key: self.group_key.clone(),
			truncated_alerts: self.truncated_alerts,
			receiver: self.receiver.clone(),
			status: self.status,
			alerts,
			group_labels: self.group_labels.clone(),
			common_labels: self.common_labels.clone(),
			common_annotations: self.common_annotations.clone(),
			external_url: self.external_url.clone(),
			excluded_alerts: self.excluded_alerts + excluded,
		}
	}

	/// number of firing alerts in the batch
	pub fn firing(&self) -> usize {
		self.alerts.iter().filter(|alert| alert.status == Status::Firing).count()
	}
}
