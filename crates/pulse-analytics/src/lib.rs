// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable analytics event pipeline for Pulse.
//!
//! Events are written to an [`EventStore`] as soon as they are queued and
//! delivered later in per-session batches through a [`BatchSender`]. Failed
//! deliveries stay in the store and push the next attempt out with an
//! exponential backoff.
//!
//! # Features
//!
//! - **Durable Queue**: Every event hits the store before it counts as queued
//! - **Session Batching**: Each flush posts one batch per session id
//! - **Backoff**: `base + min(2^failures s, max_backoff)` between attempts
//! - **Deferred Stamping**: Events queued before the session properties
//!   resolve are held and written in order once they do
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pulse_analytics::{EventFlushController, MemoryEventStore, Promise, Properties};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let properties = Promise::new();
//!
//!     let controller = EventFlushController::builder()
//!         .store(Arc::new(MemoryEventStore::new()))
//!         .sender(Arc::new(MySender::new()))
//!         .properties(properties.clone())
//!         .build()?;
//!
//!     // Held until the session properties resolve
//!     controller.track_event("appLaunched", None, Properties::new())?;
//!
//!     properties.finish(fetch_session_properties().await?);
//!
//!     controller.flush(None).await?;
//!     controller.shutdown();
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod properties;
pub mod store;
mod writer;

pub use batch::{
	group_by_session, BatchReport, BatchSender, FlushListener, FlushSummary, SessionBatch,
};
pub use config::{exponential_backoff, FlushConfig, MAX_FAILURE_EXPONENT};
pub use controller::{EventFlushController, EventFlushControllerBuilder};
pub use error::{AnalyticsError, Result, StorageError, TransportError};
pub use event::{EventFilter, EventRecord, SessionProperties};
pub use properties::Properties;
pub use store::{EventStore, FileEventStore, MemoryEventStore, DEFAULT_STORE_CAPACITY};

// Re-export promise types for convenience
pub use pulse_common_promise::{Outcome, Promise, PromiseError};
