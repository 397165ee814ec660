//! # Datastore Service Library
//!
//! In-memory, typed process-data registry for an embedded control
//! application: one authoritative place to read and write named, typed
//! datapoints, with change notification to interested subscribers.
//! Other firmware modules use it as their shared state backbone
//! instead of talking to each other directly.
//!
//! ## Architecture
//!
//! 1. **Buffer pool** — fixed freelist of equally-sized value blocks
//! 2. **Data model** — canonical per-type datapoint arrays
//! 3. **Subscriptions** — per-type bounded tables plus the notifier
//! 4. **Service** — the single worker thread draining a bounded
//!    request channel; sole mutator of the model
//!
//! ## Bounded Everything
//!
//! All tables, buffers, and queues are sized at init and never grow.
//! Submission is non-blocking, response collection is bounded by a
//! timeout, and notification staging borrows from the fixed pool.
//!
//! ## Usage
//!
//! ```no_run
//! use common::prelude::*;
//! use datastore::service::{Datastore, Limits};
//!
//! fn main() -> Result<()> {
//!     let catalog = Catalog::builder()
//!         .datapoint(DatapointType::Float, "SUPPLY_TEMP", DatapointFlags::NVM, Value::Float(21.5))
//!         .build()
//!         .map_err(|_| Error::InvalidArgument { reason: "catalog" })?;
//!     let store = Datastore::init(catalog, Limits::default())?;
//!     // register boot subscriptions here
//!     store.start()?;
//!     store.write_float(0, &[22.0])?;
//!     let mut out = [0.0f32];
//!     store.read_float(0, &mut out)?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod model;
pub mod persist;
pub mod pool;
pub mod service;
pub mod subscription;
