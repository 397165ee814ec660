//! Datastore Common Library
//!
//! This crate provides the shared types and the static datapoint catalog
//! for the datastore workspace crates.
//!
//! # Module Structure
//!
//! - [`types`] - Datapoint type enumeration, tagged value union, flags
//! - [`catalog`] - Static datapoint configuration table and TOML loading
//! - [`error`] - Error taxonomy and numeric status codes
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! common = { package = "datastore_common", path = "../datastore_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use datastore_common::prelude::*;
//! ```

pub mod catalog;
pub mod consts;
pub mod error;
pub mod prelude;
pub mod types;
