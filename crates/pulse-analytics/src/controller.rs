// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event flush controller: durable queuing, session batching and
//! backoff-driven delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pulse_common_promise::{Outcome, Promise, PromiseListener};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::batch::{group_by_session, BatchReport, BatchSender, FlushListener, FlushSummary};
use crate::config::{FlushConfig, MAX_FAILURE_EXPONENT};
use crate::error::{AnalyticsError, Result, TransportError};
use crate::event::{EventRecord, SessionProperties};
use crate::properties::Properties;
use crate::store::EventStore;
use crate::writer::{self, WriteQueue, WriteTask};

struct PendingFlush {
	id: u64,
	timer: AbortHandle,
}

/// Mutable controller state, guarded by a single lock.
#[derive(Default)]
struct FlushState {
	failure_count: u32,
	pending_flush: Option<PendingFlush>,
	next_timer_id: u64,
	/// Events accepted before the properties promise completed.
	held: Vec<EventRecord>,
	awaiting_properties: bool,
	flushing: bool,
	backgrounded: bool,
}

struct Shared {
	config: FlushConfig,
	store: Arc<dyn EventStore>,
	sender: Arc<dyn BatchSender>,
	properties: Promise<SessionProperties>,
	writes: WriteQueue,
	runtime: Handle,
	state: Mutex<FlushState>,
	shutdown: AtomicBool,
}

/// Buffers, persists, batches and delivers analytics events.
///
/// Every event is written to the [`EventStore`] through a single sequential
/// worker before it is considered queued. Flushes run on a timer: each reads
/// up to `batch_limit` stored events, splits them by session and posts every
/// session batch through the [`BatchSender`]. Delivered rows are deleted,
/// failed batches are put back and push the next attempt out by an
/// exponential backoff.
///
/// Events queued before the session properties promise completes are held in
/// memory and written, in arrival order, once it completes either way.
///
/// The controller is a cheap handle; clones share the same pipeline.
#[derive(Clone)]
pub struct EventFlushController {
	shared: Arc<Shared>,
}

impl EventFlushController {
	pub fn builder() -> EventFlushControllerBuilder {
		EventFlushControllerBuilder::new()
	}

	/// Queues an event for delivery. Returns immediately.
	pub fn queue_event(&self, record: EventRecord) -> Result<()> {
		if self.is_shutdown() {
			return Err(AnalyticsError::ClientShutdown);
		}

		let size = record.payload.encoded_len();
		if size > self.shared.config.max_payload_bytes {
			warn!(
				event_type = %record.event_type,
				size,
				"Dropping event with oversized payload"
			);
			return Err(AnalyticsError::PayloadTooLarge {
				size,
				limit: self.shared.config.max_payload_bytes,
			});
		}

		let register_listener = {
			let mut state = self.shared.state.lock();
			let outcome = self.shared.properties.outcome();

			match outcome {
				Some(outcome) if !state.awaiting_properties => {
					let properties = outcome.result();
					if properties.is_some_and(|p| p.disabled_events.is_disabled(&record)) {
						debug!(event_type = %record.event_type, "Event disabled, not recording");
						return Ok(());
					}
					return self.persist(vec![stamp(record, properties)]);
				}
				_ => {
					state.held.push(record);
					let register = !state.awaiting_properties;
					state.awaiting_properties = true;
					register
				}
			}
		};

		if register_listener {
			debug!("Holding events until session properties resolve");
			self.shared.properties.add(Arc::new(ReleaseHeldEvents {
				controller: Arc::downgrade(&self.shared),
			}));
		}

		Ok(())
	}

	/// Builds and queues an event.
	pub fn track_event(
		&self,
		event_type: &str,
		value: Option<Value>,
		metadata: Properties,
	) -> Result<()> {
		if event_type.trim().is_empty() {
			return Err(AnalyticsError::ValidationFailed(
				"event type must not be empty".to_string(),
			));
		}

		let mut record = EventRecord::new(event_type).with_payload(metadata);
		record.value = value;
		self.queue_event(record)
	}

	/// Stamps the event with the resolved session properties and submits it
	/// to the write worker. A flush is scheduled once the write is applied.
	pub fn write_event_to_db(&self, record: EventRecord) -> Result<()> {
		if self.is_shutdown() {
			return Err(AnalyticsError::ClientShutdown);
		}

		let _order = self.shared.state.lock();
		let outcome = self.shared.properties.outcome();
		let properties = outcome.as_deref().and_then(Outcome::result);
		self.persist(vec![stamp(record, properties)])
	}

	/// Callers hold the state lock so submissions keep call order.
	fn persist(&self, records: Vec<EventRecord>) -> Result<()> {
		if records.is_empty() {
			return Ok(());
		}
		self.shared.writes.submit(WriteTask::Write(records))
	}

	fn release_held_events(&self) {
		let mut state = self.shared.state.lock();
		state.awaiting_properties = false;
		let held = std::mem::take(&mut state.held);
		if held.is_empty() {
			return;
		}

		let outcome = self.shared.properties.outcome();
		let properties = outcome.as_deref().and_then(Outcome::result);
		let records: Vec<EventRecord> = held
			.into_iter()
			.filter(|record| !properties.is_some_and(|p| p.disabled_events.is_disabled(record)))
			.map(|record| stamp(record, properties))
			.collect();

		debug!(count = records.len(), "Writing events held for session properties");
		if let Err(e) = self.persist(records) {
			error!(error = %e, "Failed to submit held events");
		}
	}

	/// Arms the flush timer unless one is already pending.
	pub fn schedule_flush(&self) {
		self.arm_flush(false);
	}

	/// Replaces any pending flush timer with one using the current backoff.
	pub fn reschedule_flush(&self) {
		self.arm_flush(true);
	}

	fn arm_flush(&self, force: bool) {
		if self.is_shutdown() {
			return;
		}

		let mut state = self.shared.state.lock();

		if state.backgrounded && state.failure_count >= self.shared.config.max_background_failures {
			debug!(
				failure_count = state.failure_count,
				"Backgrounded after repeated failures, not scheduling flush"
			);
			if let Some(pending) = state.pending_flush.take() {
				pending.timer.abort();
			}
			return;
		}

		if let Some(pending) = &state.pending_flush {
			if !force {
				return;
			}
			pending.timer.abort();
		}

		let delay = self
			.shared
			.config
			.flush_delay(self.base_interval(), state.failure_count);
		state.next_timer_id += 1;
		let id = state.next_timer_id;

		let shared = Arc::downgrade(&self.shared);
		let timer = self.shared.runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(shared) = shared.upgrade() {
				EventFlushController { shared }.run_scheduled_flush(id).await;
			}
		});

		state.pending_flush = Some(PendingFlush {
			id,
			timer: timer.abort_handle(),
		});

		debug!(
			delay_ms = delay.as_millis() as u64,
			failure_count = state.failure_count,
			forced = force,
			"Scheduled event flush"
		);
	}

	async fn run_scheduled_flush(&self, id: u64) {
		{
			let mut state = self.shared.state.lock();
			if state.pending_flush.as_ref().map(|pending| pending.id) != Some(id) {
				return;
			}
			state.pending_flush = None;
		}

		match self.shared.store.event_count().await {
			Ok(0) => {
				debug!("No stored events to flush");
				return;
			}
			Ok(_) => {}
			Err(e) => error!(error = %e, "Failed to count stored events"),
		}

		if let Err(e) = self.flush(None).await {
			debug!(error = %e, "Scheduled flush did not complete");
		}
	}

	/// Reads one batch of stored events and posts it, split by session.
	///
	/// `listener` is told about every session batch. Delivery failures are
	/// reported in the summary rather than as an error.
	pub async fn flush(&self, listener: Option<Arc<dyn FlushListener>>) -> Result<FlushSummary> {
		if self.is_shutdown() {
			return Err(AnalyticsError::ClientShutdown);
		}

		{
			let mut state = self.shared.state.lock();
			if state.flushing {
				drop(state);
				self.schedule_flush();
				return Err(AnalyticsError::FlushInProgress);
			}
			state.flushing = true;
		}
		let _flushing = FlushingGuard(&self.shared);

		let epoch = self.shared.writes.epoch();
		let records = match self.shared.store.get_events(self.shared.config.batch_limit).await {
			Ok(records) => records,
			Err(e) => {
				error!(error = %e, "Failed to read stored events");
				self.record_failure();
				if let Some(listener) = &listener {
					listener.flush_failed();
				}
				self.reschedule_flush();
				return Err(e.into());
			}
		};

		if records.is_empty() {
			if let Some(listener) = &listener {
				listener.flush_completed(true);
			}
			return Ok(FlushSummary::default());
		}

		let claimed = records.len();
		let outcome = self.shared.properties.outcome();
		let properties = outcome.as_deref().and_then(Outcome::result);
		let (batches, sessionless) =
			group_by_session(records.into_iter().map(|record| stamp(record, properties)));

		let requeued = sessionless.len();
		if requeued > 0 {
			warn!(count = requeued, "Re-queueing events without a session id");
		}
		let mut requeue = sessionless;

		debug!(
			events = claimed,
			batches = batches.len(),
			"Flushing event batches"
		);

		let mut posted = Vec::with_capacity(batches.len());
		let mut tasks = Vec::with_capacity(batches.len());
		for batch in batches {
			let records = Arc::new(batch.records);
			let sender = self.shared.sender.clone();
			let session_id = batch.session_id.clone();
			let task_records = records.clone();
			tasks.push(
				self.shared
					.runtime
					.spawn(async move { sender.post_batch(&session_id, &task_records).await }),
			);
			posted.push((batch.session_id, records));
		}

		let results = futures::future::join_all(tasks).await;

		let mut reports = Vec::with_capacity(posted.len());
		for ((session_id, records), joined) in posted.into_iter().zip(results) {
			let result = joined.unwrap_or_else(|e| Err(TransportError::Panicked(e.to_string())));
			let report = self.complete_batch(session_id, &records, result, listener.as_deref());
			if !report.is_success() {
				requeue.extend(records.iter().cloned());
			}
			reports.push(report);
		}

		// Stay flushing until the claimed rows are gone, so the next flush
		// cannot read them again.
		let (done, released) = oneshot::channel();
		let release = WriteTask::Release {
			count: claimed,
			epoch,
			requeue,
			done,
		};
		match self.shared.writes.submit(release) {
			Ok(()) => {
				if released.await.is_err() {
					warn!("Write worker stopped before releasing flushed events");
				}
			}
			Err(e) => error!(error = %e, "Failed to release flushed events"),
		}

		Ok(FlushSummary {
			events: claimed,
			requeued,
			batches: reports,
		})
	}

	fn complete_batch(
		&self,
		session_id: String,
		records: &[EventRecord],
		result: std::result::Result<(), TransportError>,
		listener: Option<&dyn FlushListener>,
	) -> BatchReport {
		match result {
			Ok(()) => {
				debug!(session_id = %session_id, count = records.len(), "Flushed event batch");
				self.shared.state.lock().failure_count = 0;
				if let Some(listener) = listener {
					listener.flush_completed(true);
				}
				BatchReport {
					session_id,
					events: records.len(),
					error: None,
				}
			}
			Err(e) => {
				error!(
					session_id = %session_id,
					count = records.len(),
					error = %e,
					"Failed to post event batch"
				);
				self.record_failure();
				if let Some(listener) = listener {
					listener.flush_failed();
				}
				self.reschedule_flush();
				BatchReport {
					session_id,
					events: records.len(),
					error: Some(e),
				}
			}
		}
	}

	fn record_failure(&self) {
		let mut state = self.shared.state.lock();
		state.failure_count = (state.failure_count + 1).min(MAX_FAILURE_EXPONENT);
	}

	fn base_interval(&self) -> Duration {
		let config = &self.shared.config;
		let outcome = self.shared.properties.outcome();
		match outcome.as_deref().and_then(Outcome::result) {
			Some(properties) if properties.live_update => config.live_interval,
			Some(properties) => properties.event_interval.unwrap_or(config.base_interval),
			None => config.base_interval,
		}
	}

	/// Delay the next scheduled flush would use.
	pub fn flush_delay(&self) -> Duration {
		let failures = self.shared.state.lock().failure_count;
		self.shared.config.flush_delay(self.base_interval(), failures)
	}

	pub fn failure_count(&self) -> u32 {
		self.shared.state.lock().failure_count
	}

	pub fn reset_failure_count(&self) {
		self.shared.state.lock().failure_count = 0;
	}

	/// Number of events held in memory until the properties resolve.
	pub fn held_event_count(&self) -> usize {
		self.shared.state.lock().held.len()
	}

	pub fn has_pending_flush(&self) -> bool {
		self.shared.state.lock().pending_flush.is_some()
	}

	/// Marks the host as backgrounded, which stops scheduling after
	/// repeated failures. Returning to the foreground schedules a flush.
	pub fn set_backgrounded(&self, backgrounded: bool) {
		self.shared.state.lock().backgrounded = backgrounded;
		if !backgrounded {
			self.schedule_flush();
		}
	}

	pub fn properties(&self) -> &Promise<SessionProperties> {
		&self.shared.properties
	}

	pub async fn event_count(&self) -> Result<usize> {
		Ok(self.shared.store.event_count().await?)
	}

	/// Deletes every stored event.
	pub fn clear_event_queue(&self) -> Result<()> {
		self.shared.writes.submit(WriteTask::Clear)
	}

	/// Waits until every write submitted so far has been applied.
	pub async fn settle(&self) -> Result<()> {
		let (tx, rx) = oneshot::channel();
		self.shared.writes.submit(WriteTask::Barrier(tx))?;
		rx.await.map_err(|_| AnalyticsError::ClientShutdown)
	}

	/// Stops accepting events, cancels the pending flush and stops the write
	/// worker once it has applied everything submitted before.
	pub fn shutdown(&self) {
		if self.shared.shutdown.swap(true, Ordering::SeqCst) {
			return;
		}

		if let Some(pending) = self.shared.state.lock().pending_flush.take() {
			pending.timer.abort();
		}

		if self.shared.writes.submit(WriteTask::Stop).is_err() {
			debug!("Write worker already stopped");
		}

		info!("Event flush controller shut down");
	}

	pub fn is_shutdown(&self) -> bool {
		self.shared.shutdown.load(Ordering::SeqCst)
	}
}

fn stamp(mut record: EventRecord, properties: Option<&SessionProperties>) -> EventRecord {
	if let Some(properties) = properties {
		record.stamp(properties);
	}
	record
}

struct FlushingGuard<'a>(&'a Shared);

impl Drop for FlushingGuard<'_> {
	fn drop(&mut self) {
		self.0.state.lock().flushing = false;
	}
}

/// Writes the held events once the properties promise completes, whatever
/// the outcome.
struct ReleaseHeldEvents {
	controller: Weak<Shared>,
}

impl ReleaseHeldEvents {
	fn release(&self) {
		if let Some(shared) = self.controller.upgrade() {
			EventFlushController { shared }.release_held_events();
		}
	}
}

impl PromiseListener<SessionProperties> for ReleaseHeldEvents {
	fn succeeded(&self) {
		self.release();
	}

	fn failed_or_cancelled(&self) {
		debug!("Session properties unavailable, writing held events unstamped");
		self.release();
	}
}

/// Builder for [`EventFlushController`].
pub struct EventFlushControllerBuilder {
	store: Option<Arc<dyn EventStore>>,
	sender: Option<Arc<dyn BatchSender>>,
	properties: Option<Promise<SessionProperties>>,
	config: FlushConfig,
	runtime: Option<Handle>,
}

impl EventFlushControllerBuilder {
	pub fn new() -> Self {
		Self {
			store: None,
			sender: None,
			properties: None,
			config: FlushConfig::default(),
			runtime: None,
		}
	}

	pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn sender(mut self, sender: Arc<dyn BatchSender>) -> Self {
		self.sender = Some(sender);
		self
	}

	/// Promise resolving to the session properties used to stamp events.
	///
	/// Defaults to an already-resolved promise carrying default properties.
	pub fn properties(mut self, properties: Promise<SessionProperties>) -> Self {
		self.properties = Some(properties);
		self
	}

	pub fn config(mut self, config: FlushConfig) -> Self {
		self.config = config;
		self
	}

	/// Runtime hosting the write worker and timers. Defaults to the runtime
	/// of the calling context.
	pub fn runtime(mut self, runtime: Handle) -> Self {
		self.runtime = Some(runtime);
		self
	}

	pub fn build(self) -> Result<EventFlushController> {
		let store = self.store.ok_or(AnalyticsError::MissingCollaborator("store"))?;
		let sender = self
			.sender
			.ok_or(AnalyticsError::MissingCollaborator("sender"))?;
		let runtime = match self.runtime {
			Some(runtime) => runtime,
			None => Handle::try_current().map_err(|_| AnalyticsError::NoRuntime)?,
		};
		let properties = self.properties.unwrap_or_else(|| {
			let resolved = Promise::new();
			resolved.finish(SessionProperties::default());
			resolved
		});
		let config = self.config;

		let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
			let weak = weak.clone();
			let writes = writer::spawn(&runtime, store.clone(), move || {
				if let Some(shared) = weak.upgrade() {
					EventFlushController { shared }.schedule_flush();
				}
			});

			Shared {
				config,
				store,
				sender,
				properties,
				writes,
				runtime: runtime.clone(),
				state: Mutex::new(FlushState::default()),
				shutdown: AtomicBool::new(false),
			}
		});

		Ok(EventFlushController { shared })
	}
}

impl Default for EventFlushControllerBuilder {
	fn default() -> Self {
		Self::new()
	}
}
