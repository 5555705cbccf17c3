// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types carried by failed or cancelled promises.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Why a promise did not finish successfully.
///
/// Cloneable so a single terminal outcome can be handed to every listener.
#[derive(Debug, Clone, Error)]
pub enum PromiseError {
	/// The promise was still pending when its timeout elapsed.
	#[error("promise timed out after {0:?}")]
	Timeout(Duration),

	/// The promise was cancelled explicitly. Not a failure.
	#[error("promise was cancelled")]
	Cancelled,

	/// The producer failed with an error of its own.
	#[error("promise rejected: {0}")]
	Rejected(Arc<dyn std::error::Error + Send + Sync>),
}

impl PromiseError {
	/// Wraps an arbitrary error as a rejection.
	pub fn rejected<E>(error: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self::Rejected(Arc::new(error))
	}

	/// Rejection carrying only a message.
	pub fn message(message: impl Into<String>) -> Self {
		Self::Rejected(Arc::new(Message(message.into())))
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timeout_display_includes_duration() {
		let err = PromiseError::Timeout(Duration::from_millis(250));
		assert_eq!(err.to_string(), "promise timed out after 250ms");
		assert!(err.is_timeout());
		assert!(!err.is_cancelled());
	}

	#[test]
	fn test_message_rejection_display() {
		let err = PromiseError::message("properties endpoint unreachable");
		assert_eq!(
			err.to_string(),
			"promise rejected: properties endpoint unreachable"
		);
	}

	#[test]
	fn test_rejected_wraps_source_error() {
		let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
		let err = PromiseError::rejected(io);
		assert!(err.to_string().contains("disk gone"));
	}

	#[test]
	fn test_clone_shares_rejection() {
		let err = PromiseError::message("boom");
		let cloned = err.clone();
		match (err, cloned) {
			(PromiseError::Rejected(a), PromiseError::Rejected(b)) => assert!(Arc::ptr_eq(&a, &b)),
			_ => panic!("expected rejections"),
		}
	}
}
