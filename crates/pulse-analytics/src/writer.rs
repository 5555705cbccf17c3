// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sequential worker applying every store mutation in submission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{AnalyticsError, Result};
use crate::event::EventRecord;
use crate::store::EventStore;

/// Command sent to the write worker.
#[derive(Debug)]
pub(crate) enum WriteTask {
	/// Persist records in order.
	Write(Vec<EventRecord>),
	/// Hands back the rows a flush read: deletes the `count` claimed head rows,
	/// then appends `requeue`. Both are skipped if the store was cleared since
	/// the claim. `done` fires once applied.
	Release {
		count: usize,
		epoch: u64,
		requeue: Vec<EventRecord>,
		done: oneshot::Sender<()>,
	},
	Clear,
	/// Signals once every earlier task has been applied.
	Barrier(oneshot::Sender<()>),
	Stop,
}

/// Submission side of the write worker.
pub(crate) struct WriteQueue {
	tx: mpsc::UnboundedSender<WriteTask>,
	epoch: Arc<AtomicU64>,
}

impl WriteQueue {
	pub(crate) fn submit(&self, task: WriteTask) -> Result<()> {
		self.tx.send(task).map_err(|_| AnalyticsError::ClientShutdown)
	}

	/// Number of clears applied so far.
	pub(crate) fn epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}
}

/// Spawns the write worker on `runtime`.
///
/// `on_stored` runs after each mutation that leaves events in the store.
pub(crate) fn spawn<F>(runtime: &Handle, store: Arc<dyn EventStore>, on_stored: F) -> WriteQueue
where
	F: Fn() + Send + Sync + 'static,
{
	let (tx, rx) = mpsc::unbounded_channel();
	let epoch = Arc::new(AtomicU64::new(0));
	runtime.spawn(run(rx, store, epoch.clone(), on_stored));
	WriteQueue { tx, epoch }
}

async fn run<F>(
	mut rx: mpsc::UnboundedReceiver<WriteTask>,
	store: Arc<dyn EventStore>,
	epoch: Arc<AtomicU64>,
	on_stored: F,
) where
	F: Fn() + Send + Sync + 'static,
{
	info!("Starting event write worker");

	while let Some(task) = rx.recv().await {
		let mutated = match task {
			WriteTask::Write(records) => {
				if let Err(e) = store.write_events(&records).await {
					error!(count = records.len(), error = %e, "Failed to persist events");
				} else {
					debug!(count = records.len(), "Persisted events");
				}
				true
			}
			WriteTask::Release {
				count,
				epoch: claimed_at,
				requeue,
				done,
			} => {
				if epoch.load(Ordering::SeqCst) != claimed_at {
					debug!(count, "Store cleared since claim, dropping release");
				} else {
					release(store.as_ref(), count, &requeue).await;
				}
				let _ = done.send(());
				true
			}
			WriteTask::Clear => {
				if let Err(e) = store.clear().await {
					error!(error = %e, "Failed to clear event store");
				}
				epoch.fetch_add(1, Ordering::SeqCst);
				false
			}
			WriteTask::Barrier(done) => {
				let _ = done.send(());
				false
			}
			WriteTask::Stop => break,
		};

		if mutated {
			match store.event_count().await {
				Ok(0) => {}
				Ok(_) => on_stored(),
				Err(e) => error!(error = %e, "Failed to count stored events"),
			}
		}
	}

	info!("Event write worker stopped");
}

/// Deleting first frees at least `count` slots, so a bounded store always has
/// room for the requeued rows.
async fn release(store: &dyn EventStore, count: usize, requeue: &[EventRecord]) {
	if let Err(e) = store.delete_events(count).await {
		// Claimed rows are still in place; requeueing would duplicate them.
		error!(count, error = %e, "Failed to delete claimed events");
		return;
	}

	if requeue.is_empty() {
		return;
	}

	match store.write_events(requeue).await {
		Ok(()) => debug!(count = requeue.len(), "Requeued undelivered events"),
		Err(e) => error!(
			count = requeue.len(),
			error = %e,
			"Failed to requeue undelivered events"
		),
	}
}
