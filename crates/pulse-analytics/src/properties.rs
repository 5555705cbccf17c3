// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured payload attached to an event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object of event metadata.
///
/// # Example
///
/// ```
/// use pulse_analytics::Properties;
///
/// let props = Properties::new()
///     .insert("screen", "checkout")
///     .insert("items", 3)
///     .insert("total", 99.99);
/// assert_eq!(props.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair, replacing any previous value for the key.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.inner.iter()
	}

	/// Size of the payload once serialized as JSON.
	pub fn encoded_len(&self) -> usize {
		serde_json::to_vec(&self.inner).map(|bytes| bytes.len()).unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_properties_new_is_empty() {
		let props = Properties::new();
		assert!(props.is_empty());
		assert_eq!(props.len(), 0);
		assert_eq!(props.encoded_len(), 2);
	}


	#[test]
	fn test_insert_replaces_existing_key() {
		let props = Properties::new().insert("plan", "free").insert("plan", "team");
		assert_eq!(props.len(), 1);
		assert_eq!(props.get("plan"), Some(&json!("team")));
	}

	#[test]
	fn test_serializes_as_plain_object() {
		let props = Properties::new().insert("a", 1);
		assert_eq!(serde_json::to_string(&props).unwrap(), r#"{"a":1}"#);
		let back: Properties = serde_json::from_str(r#"{"a":1}"#).unwrap();
		assert_eq!(back, props);
	}

	#[test]
	fn test_encoded_len_tracks_content() {
		let small = Properties::new().insert("k", "v");
		let large = Properties::new().insert("k", "v".repeat(100));
		assert!(large.encoded_len() > small.encoded_len() + 90);
	}
}
