//! Canonical datapoint arrays and bounds-checked access primitives.
//!
//! One array per [`DatapointType`], created once from the catalog and
//! alive for the process lifetime. Only the worker thread mutates the
//! model; everything here is plain single-threaded code.

use tracing::warn;

use common::catalog::Catalog;
use common::error::{Error, Result};
use common::types::{Datapoint, DatapointFlags, DatapointType, Value, TYPE_COUNT};

/// The typed data model: six canonical datapoint arrays.
#[derive(Debug)]
pub struct DataModel {
    tables: [Vec<Datapoint>; TYPE_COUNT],
}

impl DataModel {
    /// Build the arrays from the catalog defaults.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut tables: [Vec<Datapoint>; TYPE_COUNT] = Default::default();
        for ty in DatapointType::ALL {
            tables[ty.index()] = catalog
                .specs(ty)
                .iter()
                .map(|spec| Datapoint {
                    value: spec.default,
                    flags: spec.flags,
                })
                .collect();
        }
        Self { tables }
    }

    /// Datapoint count of a type.
    #[inline]
    pub fn datapoint_count(&self, ty: DatapointType) -> usize {
        self.tables[ty.index()].len()
    }

    /// Current value of a single datapoint.
    pub fn value(&self, ty: DatapointType, id: u32) -> Option<Value> {
        self.tables[ty.index()].get(id as usize).map(|dp| dp.value)
    }

    /// Flags of a single datapoint.
    pub fn flags(&self, ty: DatapointType, id: u32) -> Option<DatapointFlags> {
        self.tables[ty.index()].get(id as usize).map(|dp| dp.flags)
    }

    /// Copy the current values of `[start_id, start_id + out.len())`
    /// into `out`.
    pub fn read(&self, ty: DatapointType, start_id: u32, out: &mut [Value]) -> Result<()> {
        self.check_range(ty, start_id, out.len())?;
        let start = start_id as usize;
        let len = out.len();
        let table = &self.tables[ty.index()];
        for (dst, dp) in out.iter_mut().zip(&table[start..start + len]) {
            *dst = dp.value;
        }
        Ok(())
    }

    /// Store `values` at `[start_id, start_id + values.len())`.
    ///
    /// Returns `true` iff at least one stored value differed from its
    /// replacement (bitwise per tag). Unchanged writes must not
    /// trigger notification.
    pub fn write(&mut self, ty: DatapointType, start_id: u32, values: &[Value]) -> Result<bool> {
        self.check_range(ty, start_id, values.len())?;
        if values.iter().any(|v| v.tag() != ty.tag()) {
            return Err(Error::InvalidArgument {
                reason: "value tag does not match datapoint type",
            });
        }

        let start = start_id as usize;
        let table = &mut self.tables[ty.index()];
        let mut changed = false;
        for (dp, value) in table[start..start + values.len()].iter_mut().zip(values) {
            if dp.value != *value {
                dp.value = *value;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Overwrite a single datapoint without change tracking.
    ///
    /// Used by the persistence restore pass before the worker starts;
    /// a tag-mismatched replacement is dropped with a warning rather
    /// than aborting boot.
    pub fn restore_value(&mut self, ty: DatapointType, id: u32, value: Value) -> Result<()> {
        self.check_range(ty, id, 1)?;
        if value.tag() != ty.tag() {
            warn!(?ty, id, "dropping restored value with mismatched tag");
            return Err(Error::InvalidArgument {
                reason: "restored value tag does not match datapoint type",
            });
        }
        self.tables[ty.index()][id as usize].value = value;
        Ok(())
    }

    fn check_range(&self, ty: DatapointType, start_id: u32, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidArgument {
                reason: "datapoint count must be nonzero",
            });
        }
        let limit = self.datapoint_count(ty);
        let end = (start_id as usize).checked_add(count);
        match end {
            Some(end) if end <= limit => Ok(()),
            _ => Err(Error::OutOfRange {
                ty,
                start_id,
                count,
                limit,
            }),
        }
    }
}
