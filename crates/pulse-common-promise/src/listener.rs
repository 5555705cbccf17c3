// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Terminal outcomes and the listener surface notified with them.

use crate::error::PromiseError;

/// Lifecycle state of a [`Promise`](crate::Promise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
	Pending,
	Finished,
	Failed,
	Cancelled,
}

impl PromiseState {
	pub fn is_terminal(self) -> bool {
		!matches!(self, PromiseState::Pending)
	}
}

/// The single terminal outcome of a promise.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
	/// Finished, with or without a result value.
	Finished(Option<T>),
	Failed(PromiseError),
	Cancelled,
}

impl<T> Outcome<T> {
	pub fn state(&self) -> PromiseState {
		match self {
			Outcome::Finished(_) => PromiseState::Finished,
			Outcome::Failed(_) => PromiseState::Failed,
			Outcome::Cancelled => PromiseState::Cancelled,
		}
	}

	pub fn result(&self) -> Option<&T> {
		match self {
			Outcome::Finished(result) => result.as_ref(),
			_ => None,
		}
	}

	/// The error a failed or cancelled promise reports.
	pub fn error(&self) -> Option<&PromiseError> {
		match self {
			Outcome::Failed(error) => Some(error),
			Outcome::Cancelled => Some(&CANCELLED),
			Outcome::Finished(_) => None,
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Outcome::Finished(_))
	}
}

static CANCELLED: PromiseError = PromiseError::Cancelled;

/// Receives the outcome of a promise.
///
/// Implementors either override [`on_outcome`](Self::on_outcome) to handle the
/// tagged outcome directly, or override any subset of the capability methods
/// below. The default `on_outcome` calls the applicable capability methods in
/// a fixed order:
///
/// | Outcome   | Calls |
/// |-----------|-------|
/// | Finished  | `succeeded_with`, `succeeded`, `completed` |
/// | Failed    | `failed_with`, `failed`, `failed_or_cancelled_with`, `failed_or_cancelled`, `completed` |
/// | Cancelled | `cancelled`, `failed_or_cancelled_with`, `failed_or_cancelled`, `completed` |
///
/// Listeners may be invoked from whichever thread completes the promise, or
/// synchronously from [`Promise::add`](crate::Promise::add) when the promise
/// has already completed.
pub trait PromiseListener<T>: Send + Sync {
	fn on_outcome(&self, outcome: &Outcome<T>) {
		match outcome {
			Outcome::Finished(result) => {
				self.succeeded_with(result.as_ref());
				self.succeeded();
			}
			Outcome::Failed(error) => {
				self.failed_with(error);
				self.failed();
				self.failed_or_cancelled_with(error);
				self.failed_or_cancelled();
			}
			Outcome::Cancelled => {
				self.cancelled();
				self.failed_or_cancelled_with(&CANCELLED);
				self.failed_or_cancelled();
			}
		}
		self.completed();
	}

	fn succeeded_with(&self, _result: Option<&T>) {}

	fn succeeded(&self) {}

	fn failed_with(&self, _error: &PromiseError) {}

	fn failed(&self) {}

	fn cancelled(&self) {}

	fn failed_or_cancelled_with(&self, _error: &PromiseError) {}

	fn failed_or_cancelled(&self) {}

	/// Called last for every outcome. Safe point to release anything held
	/// for the promise's sake.
	fn completed(&self) {}
}

impl<T, F> PromiseListener<T> for F
where
	F: Fn(&Outcome<T>) + Send + Sync,
{
	fn on_outcome(&self, outcome: &Outcome<T>) {
		self(outcome)
	}
}
