//! Non-volatile storage boundary.
//!
//! The datastore itself never talks to durable storage; it only offers
//! NVM-flagged datapoints to an optional [`PersistenceProvider`] at
//! startup, before the boot notification sweep. Absence of a provider
//! means catalog defaults are used as-is.

use common::types::{DatapointType, Value};

/// Supplier of durably stored datapoint values.
///
/// Implementors are queried once per NVM-flagged datapoint during
/// init. Returning `Some(value)` overwrites the catalog default;
/// `None` keeps it. A returned value whose tag does not match the
/// datapoint type is dropped with a warning.
pub trait PersistenceProvider {
    /// Look up the stored value for one datapoint.
    fn restore(
        &mut self,
        ty: DatapointType,
        id: u32,
        name: &str,
        default: Value,
    ) -> Option<Value>;
}

/// Provider used when no durable storage is attached.
pub struct NoPersistence;

impl PersistenceProvider for NoPersistence {
    fn restore(
        &mut self,
        _ty: DatapointType,
        _id: u32,
        _name: &str,
        _default: Value,
    ) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_persistence_keeps_defaults() {
        let mut provider = NoPersistence;
        assert_eq!(
            provider.restore(DatapointType::Float, 0, "X", Value::Float(1.0)),
            None
        );
    }
}
