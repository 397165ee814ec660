//! Common re-exports for convenience.

pub use crate::catalog::{Catalog, CatalogBuilder, CatalogError, DatapointSpec};
pub use crate::error::{Error, Result};
pub use crate::types::{Datapoint, DatapointFlags, DatapointType, Value, ValueTag, TYPE_COUNT};
