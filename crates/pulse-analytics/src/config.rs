// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flush timing, batching limits and the backoff law.

use std::time::Duration;

use serde::Deserialize;

/// Failure counts above this no longer grow the exponential term.
pub const MAX_FAILURE_EXPONENT: u32 = 32;

/// Configuration for the event flush controller.
///
/// Deserializable so hosts can embed it in their own config files; durations
/// are given in whole seconds and missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
	/// Interval between periodic flushes.
	#[serde(with = "duration_secs")]
	pub base_interval: Duration,
	/// Interval used instead of `base_interval` for live-update builds.
	#[serde(with = "duration_secs")]
	pub live_interval: Duration,
	/// Upper bound of the exponential backoff term.
	#[serde(with = "duration_secs")]
	pub max_backoff: Duration,
	/// Random extra delay added to the backoff term after failures. Zero
	/// disables jitter.
	#[serde(with = "duration_secs")]
	pub backoff_jitter: Duration,
	/// Maximum number of stored events read per flush.
	pub batch_limit: usize,
	/// Maximum serialized payload size of a single event.
	pub max_payload_bytes: usize,
	/// While the host is backgrounded, stop scheduling flushes after this
	/// many consecutive failures.
	pub max_background_failures: u32,
}

impl Default for FlushConfig {
	fn default() -> Self {
		Self {
			base_interval: Duration::from_secs(60),
			live_interval: Duration::from_secs(5),
			max_backoff: Duration::from_secs(300),
			backoff_jitter: Duration::ZERO,
			batch_limit: 100,
			max_payload_bytes: 50_000,
			max_background_failures: 5,
		}
	}
}

impl FlushConfig {
	/// Backoff term for `failures` consecutive failures, jitter included.
	pub fn backoff(&self, failures: u32) -> Duration {
		let exponential = exponential_backoff(failures);
		let jitter = if failures > 0 && !self.backoff_jitter.is_zero() {
			let max_ms = self.backoff_jitter.as_millis().min(u64::MAX as u128) as u64;
			Duration::from_millis(fastrand::u64(0..max_ms.max(1)))
		} else {
			Duration::ZERO
		};
		exponential.saturating_add(jitter).min(self.max_backoff)
	}

	/// Delay before the next flush: `base + min(2^failures s, max_backoff)`.
	pub fn flush_delay(&self, base: Duration, failures: u32) -> Duration {
		base.saturating_add(self.backoff(failures))
	}
}

/// `2^failures` seconds, with the exponent capped at [`MAX_FAILURE_EXPONENT`].
pub fn exponential_backoff(failures: u32) -> Duration {
	Duration::from_secs(1u64 << failures.min(MAX_FAILURE_EXPONENT))
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer};

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_secs)
	}
}
