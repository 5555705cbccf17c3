// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Promise primitive shared by the Pulse SDK crates.
//!
//! A [`Promise`] is a single-assignment, thread-safe future that fans its
//! terminal [`Outcome`] out to every registered [`PromiseListener`]. It backs
//! the "properties loaded" gate of the analytics pipeline and any other
//! one-shot signal that several parties need to observe.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pulse_common_promise::{Outcome, Promise};
//!
//! let promise: Promise<u32> = Promise::new();
//! promise.add(Arc::new(|outcome: &Outcome<u32>| {
//!     println!("completed with {:?}", outcome.result());
//! }));
//! promise.finish(42);
//! assert_eq!(promise.result(), Some(42));
//! ```

mod error;
mod listener;
mod promise;

pub use error::PromiseError;
pub use listener::{Outcome, PromiseListener, PromiseState};
pub use promise::Promise;
