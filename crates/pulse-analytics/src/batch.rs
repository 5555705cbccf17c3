// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session batches and the collaborators that deliver them.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::event::EventRecord;

/// Network channel that delivers a batch of events for one session.
///
/// Completion may happen on any thread.
#[async_trait]
pub trait BatchSender: Send + Sync {
	async fn post_batch(
		&self,
		session_id: &str,
		records: &[EventRecord],
	) -> Result<(), TransportError>;
}

/// Observer of flush results, notified once per posted batch.
pub trait FlushListener: Send + Sync {
	fn flush_completed(&self, _success: bool) {}

	fn flush_failed(&self) {}
}

/// Events of a single session, in stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBatch {
	pub session_id: String,
	pub records: Vec<EventRecord>,
}

/// Splits records into per-session batches.
///
/// Batches are ordered by the first appearance of their session and keep the
/// relative order of their records. Records without a session id are returned
/// separately.
pub fn group_by_session<I>(records: I) -> (Vec<SessionBatch>, Vec<EventRecord>)
where
	I: IntoIterator<Item = EventRecord>,
{
	let mut batches: Vec<SessionBatch> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();
	let mut sessionless = Vec::new();

	for record in records {
		let Some(session_id) = record.session_id.clone() else {
			sessionless.push(record);
			continue;
		};

		match index.get(&session_id) {
			Some(&i) => batches[i].records.push(record),
			None => {
				index.insert(session_id.clone(), batches.len());
				batches.push(SessionBatch {
					session_id,
					records: vec![record],
				});
			}
		}
	}

	(batches, sessionless)
}

/// Result of posting one session batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
	pub session_id: String,
	pub events: usize,
	pub error: Option<TransportError>,
}

impl BatchReport {
	pub fn is_success(&self) -> bool {
		self.error.is_none()
	}
}

/// Result of one flush pass.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
	/// Events read from the store.
	pub events: usize,
	/// Events put back because they had no session id.
	pub requeued: usize,
	pub batches: Vec<BatchReport>,
}

impl FlushSummary {
	pub fn succeeded(&self) -> usize {
		self.batches.iter().filter(|b| b.is_success()).count()
	}

	pub fn failed(&self) -> usize {
		self.batches.len() - self.succeeded()
	}

	pub fn is_success(&self) -> bool {
		self.failed() == 0
	}
}
