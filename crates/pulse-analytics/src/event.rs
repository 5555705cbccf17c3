// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event records and the session properties used to stamp them.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::properties::Properties;

/// A single analytics event.
///
/// `session_id` and `production` stay empty until the event is stamped with
/// the resolved [`SessionProperties`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
	pub id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	pub event_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub goal_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default)]
	pub payload: Properties,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub production: Option<bool>,
}

impl EventRecord {
	pub fn new(event_type: impl Into<String>) -> Self {
		Self {
			id: Uuid::now_v7(),
			session_id: None,
			event_type: event_type.into(),
			goal_name: None,
			value: None,
			payload: Properties::new(),
			timestamp: Utc::now(),
			production: None,
		}
	}

	pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
		self.session_id = Some(session_id.into());
		self
	}

	pub fn with_goal_name(mut self, goal_name: impl Into<String>) -> Self {
		self.goal_name = Some(goal_name.into());
		self
	}

	pub fn with_value(mut self, value: impl Into<Value>) -> Self {
		self.value = Some(value.into());
		self
	}

	pub fn with_payload(mut self, payload: Properties) -> Self {
		self.payload = payload;
		self
	}

	/// Fills in session id and environment flag from `properties` where the
	/// event does not carry them already.
	pub fn stamp(&mut self, properties: &SessionProperties) {
		if self.session_id.is_none() {
			self.session_id = properties.effective_session_id().map(str::to_owned);
		}
		if self.production.is_none() {
			self.production = Some(!properties.live_update);
		}
	}

	/// Looks up a field for event filtering. `goal_name` and `value` address
	/// the record's own fields, anything else the payload.
	fn field(&self, key: &str) -> Option<Value> {
		match key {
			"goal_name" => self.goal_name.clone().map(Value::String),
			"value" => self.value.clone(),
			_ => self.payload.get(key).cloned(),
		}
	}
}

/// Session and runtime configuration resolved from the backend.
#[derive(Debug, Clone, Default)]
pub struct SessionProperties {
	pub session_id: Option<String>,
	/// Used when the current session id is not known yet.
	pub last_session_id: Option<String>,
	/// Development build with live reporting; events are stamped non-production.
	pub live_update: bool,
	/// Server override for the base flush interval.
	pub event_interval: Option<Duration>,
	pub disabled_events: EventFilter,
}

impl SessionProperties {
	pub fn new(session_id: impl Into<String>) -> Self {
		Self {
			session_id: Some(session_id.into()),
			..Self::default()
		}
	}

	pub fn effective_session_id(&self) -> Option<&str> {
		self.session_id
			.as_deref()
			.or(self.last_session_id.as_deref())
	}
}

/// Server-provided list of event types that must not be recorded.
///
/// Each event type maps to a list of filters. An event is disabled when any
/// filter for its type matches, and a filter matches when every one of its
/// keys equals the corresponding event field. A filter with no keys disables
/// the whole event type.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
	rules: HashMap<String, Vec<Properties>>,
}

impl EventFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn disable(mut self, event_type: impl Into<String>, filter: Properties) -> Self {
		self.rules.entry(event_type.into()).or_default().push(filter);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	pub fn is_disabled(&self, record: &EventRecord) -> bool {
		if record.event_type.is_empty() {
			return false;
		}

		let Some(filters) = self.rules.get(&record.event_type) else {
			return false;
		};

		filters.iter().any(|filter| {
			filter
				.iter()
				.all(|(key, expected)| record.field(key).as_ref() == Some(expected))
		})
	}
}
