// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable event storage.

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::event::EventRecord;

/// Default capacity of the in-memory store.
pub const DEFAULT_STORE_CAPACITY: usize = 1000;

/// Ordered, durable storage for events awaiting delivery.
///
/// Records are kept in insertion order; reads and deletes work from the
/// oldest record.
#[async_trait]
pub trait EventStore: Send + Sync {
	async fn write_event(&self, record: &EventRecord) -> Result<(), StorageError>;

	async fn write_events(&self, records: &[EventRecord]) -> Result<(), StorageError> {
		for record in records {
			self.write_event(record).await?;
		}
		Ok(())
	}

	/// Returns up to `limit` of the oldest records without removing them.
	async fn get_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError>;

	/// Removes the `count` oldest records.
	async fn delete_events(&self, count: usize) -> Result<(), StorageError>;

	async fn event_count(&self) -> Result<usize, StorageError>;

	async fn clear(&self) -> Result<(), StorageError> {
		let count = self.event_count().await?;
		self.delete_events(count).await
	}
}

/// Bounded in-memory store. Writes beyond capacity are rejected.
pub struct MemoryEventStore {
	capacity: usize,
	records: Mutex<VecDeque<EventRecord>>,
}

impl MemoryEventStore {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_STORE_CAPACITY)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			capacity,
			records: Mutex::new(VecDeque::new()),
		}
	}

	/// Copy of every stored record, oldest first.
	pub fn snapshot(&self) -> Vec<EventRecord> {
		self.records.lock().iter().cloned().collect()
	}
}

impl Default for MemoryEventStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl EventStore for MemoryEventStore {
	async fn write_event(&self, record: &EventRecord) -> Result<(), StorageError> {
		let mut records = self.records.lock();
		if records.len() >= self.capacity {
			warn!(
				event_type = %record.event_type,
				capacity = self.capacity,
				"event store full, rejecting event"
			);
			return Err(StorageError::Full {
				capacity: self.capacity,
			});
		}
		records.push_back(record.clone());
		Ok(())
	}

	async fn get_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
		Ok(self.records.lock().iter().take(limit).cloned().collect())
	}

	async fn delete_events(&self, count: usize) -> Result<(), StorageError> {
		let mut records = self.records.lock();
		let count = count.min(records.len());
		records.drain(..count);
		Ok(())
	}

	async fn event_count(&self) -> Result<usize, StorageError> {
		Ok(self.records.lock().len())
	}
}

/// Store backed by a JSON-lines file, one event per line.
///
/// Appends go straight to the end of the file; deletes rewrite the file via a
/// temporary sibling and an atomic rename.
pub struct FileEventStore {
	path: PathBuf,
	io: tokio::sync::Mutex<()>,
}

impl FileEventStore {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			io: tokio::sync::Mutex::new(()),
		}
	}

	/// Opens the store under the platform data directory.
	pub fn from_xdg() -> Result<Self, StorageError> {
		let data_dir = dirs::data_dir().ok_or_else(|| {
			StorageError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				"could not determine XDG data directory",
			))
		})?;

		let events_dir = data_dir.join("pulse");
		std::fs::create_dir_all(&events_dir)?;
		let path = events_dir.join("events.jsonl");

		info!(path = %path.display(), "initialized file event store");

		Ok(Self::new(path))
	}

	pub fn path(&self) -> &PathBuf {
		&self.path
	}

	async fn read_all(&self) -> Result<Vec<EventRecord>, StorageError> {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut records = Vec::new();
		for (index, line) in contents.lines().enumerate() {
			if line.trim().is_empty() {
				continue;
			}
			match serde_json::from_str::<EventRecord>(line) {
				Ok(record) => records.push(record),
				Err(e) => warn!(
					path = %self.path.display(),
					line = index + 1,
					error = %e,
					"skipping unreadable stored event"
				),
			}
		}

		Ok(records)
	}

	async fn append(&self, records: &[EventRecord]) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let mut buf = String::new();
		for record in records {
			buf.push_str(&serde_json::to_string(record)?);
			buf.push('\n');
		}

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await?;
		file.write_all(buf.as_bytes()).await?;
		file.flush().await?;
		Ok(())
	}
}

#[async_trait]
impl EventStore for FileEventStore {
	async fn write_event(&self, record: &EventRecord) -> Result<(), StorageError> {
		let _io = self.io.lock().await;
		self.append(std::slice::from_ref(record)).await
	}

	async fn write_events(&self, records: &[EventRecord]) -> Result<(), StorageError> {
		let _io = self.io.lock().await;
		self.append(records).await
	}

	async fn get_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
		let _io = self.io.lock().await;
		let mut records = self.read_all().await?;
		records.truncate(limit);
		Ok(records)
	}

	async fn delete_events(&self, count: usize) -> Result<(), StorageError> {
		let _io = self.io.lock().await;
		let records = self.read_all().await?;
		if records.is_empty() || count == 0 {
			return Ok(());
		}

		let mut buf = String::new();
		for record in records.iter().skip(count) {
			buf.push_str(&serde_json::to_string(record)?);
			buf.push('\n');
		}

		let tmp_path = self.path.with_extension("jsonl.tmp");
		tokio::fs::write(&tmp_path, buf.as_bytes()).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;

		debug!(
			path = %self.path.display(),
			deleted = count.min(records.len()),
			remaining = records.len().saturating_sub(count),
			"deleted stored events"
		);

		Ok(())
	}

	async fn event_count(&self) -> Result<usize, StorageError> {
		let _io = self.io.lock().await;
		Ok(self.read_all().await?.len())
	}
}
