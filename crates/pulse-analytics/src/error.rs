// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics pipeline.

use thiserror::Error;

/// Failure reading or writing the durable event store.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("event store is full ({capacity} events)")]
	Full { capacity: usize },

	#[error("event store unavailable: {0}")]
	Unavailable(String),
}

/// Failure posting a batch over the network channel.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
	/// Server returned an error response.
	#[error("server error ({status}): {message}")]
	Server { status: u16, message: String },

	/// Rate limited by the server.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited { retry_after_secs: Option<u64> },

	#[error("network error: {0}")]
	Network(String),

	#[error("request timed out")]
	Timeout,

	/// The sender panicked while posting the batch.
	#[error("batch sender panicked: {0}")]
	Panicked(String),
}

/// Analytics pipeline errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("transport error: {0}")]
	Transport(#[from] TransportError),

	/// Controller has been shut down.
	#[error("controller has been shut down")]
	ClientShutdown,

	/// No tokio runtime was available to host the background workers.
	#[error("no tokio runtime available")]
	NoRuntime,

	/// Another flush is already running.
	#[error("a flush is already in progress")]
	FlushInProgress,

	#[error("event payload is {size} bytes, limit is {limit}")]
	PayloadTooLarge { size: usize, limit: usize },

	/// Event validation failed.
	#[error("event validation failed: {0}")]
	ValidationFailed(String),

	#[error("missing collaborator: {0}")]
	MissingCollaborator(&'static str),
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
