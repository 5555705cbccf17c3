// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-assignment promise with multicast listener notification.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::PromiseError;
use crate::listener::{Outcome, PromiseListener, PromiseState};

type SharedListener<T> = Arc<dyn PromiseListener<T>>;

struct Slot<T> {
	outcome: Option<Arc<Outcome<T>>>,
	listeners: Vec<SharedListener<T>>,
}

/// A thread-safe, single-assignment future.
///
/// A promise starts pending and is completed at most once by
/// [`finish`](Self::finish), [`finish_empty`](Self::finish_empty),
/// [`fail`](Self::fail) or [`cancel`](Self::cancel). Whichever call gets there
/// first wins; every later call is a silent no-op that returns `false`.
///
/// Listeners registered before completion are notified once, in registration
/// order, by the winning caller after the lock is released. Listeners
/// registered after completion are notified synchronously inside
/// [`add`](Self::add).
///
/// Cloning a promise yields another handle to the same shared state.
pub struct Promise<T> {
	slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Promise<T> {
	pub fn new() -> Self {
		Self {
			slot: Arc::new(Mutex::new(Slot {
				outcome: None,
				listeners: Vec::new(),
			})),
		}
	}

	/// Registers a listener and hands it back.
	///
	/// If the promise already completed, the listener is notified before this
	/// returns and is not retained.
	pub fn add<L>(&self, listener: Arc<L>) -> Arc<L>
	where
		L: PromiseListener<T> + 'static,
	{
		let completed = {
			let mut slot = self.slot.lock();
			if let Some(outcome) = slot.outcome.clone() {
				Some(outcome)
			} else {
				slot.listeners.push(listener.clone());
				None
			}
		};

		if let Some(outcome) = completed {
			listener.on_outcome(&outcome);
		}

		listener
	}

	/// Finishes with a result value.
	pub fn finish(&self, result: T) -> bool {
		self.complete(Outcome::Finished(Some(result)))
	}

	/// Finishes without a result value.
	pub fn finish_empty(&self) -> bool {
		self.complete(Outcome::Finished(None))
	}

	pub fn fail(&self, error: PromiseError) -> bool {
		self.complete(Outcome::Failed(error))
	}

	pub fn cancel(&self) -> bool {
		self.complete(Outcome::Cancelled)
	}

	fn complete(&self, outcome: Outcome<T>) -> bool {
		let (outcome, listeners) = {
			let mut slot = self.slot.lock();
			if slot.outcome.is_some() {
				return false;
			}
			let outcome = Arc::new(outcome);
			slot.outcome = Some(outcome.clone());
			(outcome, std::mem::take(&mut slot.listeners))
		};

		for listener in &listeners {
			listener.on_outcome(&outcome);
		}

		true
	}

	pub fn state(&self) -> PromiseState {
		self
			.slot
			.lock()
			.outcome
			.as_ref()
			.map(|outcome| outcome.state())
			.unwrap_or(PromiseState::Pending)
	}

	pub fn is_complete(&self) -> bool {
		self.state().is_terminal()
	}

	pub fn is_finished(&self) -> bool {
		self.state() == PromiseState::Finished
	}

	pub fn has_failed(&self) -> bool {
		self.state() == PromiseState::Failed
	}

	pub fn is_cancelled(&self) -> bool {
		self.state() == PromiseState::Cancelled
	}

	/// Whether any listener is still waiting for completion.
	pub fn has_listeners(&self) -> bool {
		!self.slot.lock().listeners.is_empty()
	}

	/// The terminal outcome, or `None` while pending.
	pub fn outcome(&self) -> Option<Arc<Outcome<T>>> {
		self.slot.lock().outcome.clone()
	}

	/// The error of a failed or cancelled promise.
	pub fn error(&self) -> Option<PromiseError> {
		self.outcome().and_then(|outcome| outcome.error().cloned())
	}
}

impl<T: Clone> Promise<T> {
	/// The result of a finished promise, if it carried one.
	pub fn result(&self) -> Option<T> {
		self.outcome().and_then(|outcome| outcome.result().cloned())
	}
}

impl<T: Send + Sync + 'static> Promise<T> {
	/// Fails the promise with [`PromiseError::Timeout`] unless it completes
	/// within `after`. Uses the tokio runtime of the calling context.
	pub fn timeout(&self, after: Duration) -> Result<(), TryCurrentError> {
		let handle = Handle::try_current()?;
		self.timeout_on(&handle, after);
		Ok(())
	}

	/// Like [`timeout`](Self::timeout) but schedules on an explicit runtime.
	///
	/// The timer task is aborted as soon as the promise completes for any
	/// reason.
	pub fn timeout_on(&self, handle: &Handle, after: Duration) {
		let promise = self.clone();
		let timer = handle.spawn(async move {
			tokio::time::sleep(after).await;
			if promise.fail(PromiseError::Timeout(after)) {
				debug!(timeout_ms = after.as_millis() as u64, "promise timed out");
			}
		});

		self.add(Arc::new(AbortOnComplete(timer.abort_handle())));
	}

	/// Waits for the promise to complete.
	///
	/// Resolves to [`Outcome::Cancelled`] if the notification channel is torn
	/// down without the promise completing.
	pub async fn wait(&self) -> Arc<Outcome<T>> {
		if let Some(outcome) = self.outcome() {
			return outcome;
		}

		let (tx, rx) = oneshot::channel::<()>();
		let tx = Mutex::new(Some(tx));
		self.add(Arc::new(move |_: &Outcome<T>| {
			if let Some(tx) = tx.lock().take() {
				let _ = tx.send(());
			}
		}));

		rx.await
			.ok()
			.and_then(|_| self.outcome())
			.unwrap_or_else(|| Arc::new(Outcome::Cancelled))
	}
}

struct AbortOnComplete(AbortHandle);

impl<T> PromiseListener<T> for AbortOnComplete {
	fn completed(&self) {
		self.0.abort();
	}
}

impl<T> Clone for Promise<T> {
	fn clone(&self) -> Self {
		Self {
			slot: self.slot.clone(),
		}
	}
}

impl<T> Default for Promise<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for Promise<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Promise")
			.field("state", &self.state())
			.field("listeners", &self.slot.lock().listeners.len())
			.finish()
	}
}
