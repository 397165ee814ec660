//! Static datapoint catalog.
//!
//! The catalog is the build/config-time table defining, for each
//! datapoint type, the ordered list of `(name, flags, default value)`
//! records. It fixes every type's datapoint count and initial
//! contents, and is the only place name↔index translation lives — the
//! shell collaborator resolves names here before calling the
//! read/write API.
//!
//! Deserialized from `catalog.toml` at startup, or assembled in code
//! via [`CatalogBuilder`] for firmware images and tests.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::types::{DatapointFlags, DatapointType, Value, TYPE_COUNT};

/// Error type for catalog loading and validation.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Catalog file not found at the specified path.
    #[error("catalog file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse catalog: {0}")]
    ParseError(String),

    /// A datapoint entry has an empty name.
    #[error("{ty:?} datapoint {index} has an empty name")]
    EmptyName {
        /// Affected datapoint type.
        ty: DatapointType,
        /// Index of the offending entry within its type.
        index: usize,
    },

    /// Two datapoints of the same type share a name.
    #[error("duplicate {ty:?} datapoint name '{name}'")]
    DuplicateName {
        /// Affected datapoint type.
        ty: DatapointType,
        /// The duplicated name.
        name: String,
    },

    /// A default value's tag does not match its datapoint type.
    #[error("{ty:?} datapoint '{name}' has a default of the wrong value tag")]
    TagMismatch {
        /// Affected datapoint type.
        ty: DatapointType,
        /// Name of the offending entry.
        name: String,
    },
}

/// One catalog record: a named datapoint with flags and a default.
#[derive(Debug, Clone, PartialEq)]
pub struct DatapointSpec {
    /// Stable datapoint name.
    pub name: String,
    /// Datapoint flags.
    pub flags: DatapointFlags,
    /// Initial value loaded at process start.
    pub default: Value,
}

/// The static configuration table, one ordered list per type.
///
/// Immutable after construction; the datapoint index within a type is
/// the entry's position in its list and is stable for the process
/// lifetime.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: [Vec<DatapointSpec>; TYPE_COUNT],
}

impl Catalog {
    /// Start building a catalog in code.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Parse a catalog from TOML text and validate it.
    pub fn from_toml(toml_str: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog =
            toml::from_str(toml_str).map_err(|e| CatalogError::ParseError(e.to_string()))?;
        raw.into_catalog()
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CatalogError::FileNotFound
            } else {
                CatalogError::ParseError(e.to_string())
            }
        })?;
        let catalog = Self::from_toml(&content)?;
        debug!(path = %path.display(), %catalog, "catalog loaded");
        Ok(catalog)
    }

    /// Datapoint count of a type.
    #[inline]
    pub fn datapoint_count(&self, ty: DatapointType) -> usize {
        self.tables[ty.index()].len()
    }

    /// Largest datapoint count across all types.
    pub fn max_datapoint_count(&self) -> usize {
        self.tables.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// The ordered specs of a type.
    #[inline]
    pub fn specs(&self, ty: DatapointType) -> &[DatapointSpec] {
        &self.tables[ty.index()]
    }

    /// Translate a datapoint name to its index within a type.
    pub fn index_of(&self, ty: DatapointType, name: &str) -> Option<u32> {
        self.tables[ty.index()]
            .iter()
            .position(|spec| spec.name == name)
            .map(|idx| idx as u32)
    }

    /// Translate a datapoint index to its name.
    pub fn name_of(&self, ty: DatapointType, id: u32) -> Option<&str> {
        self.tables[ty.index()]
            .get(id as usize)
            .map(|spec| spec.name.as_str())
    }

    fn validate(self) -> Result<Self, CatalogError> {
        for ty in DatapointType::ALL {
            let specs = &self.tables[ty.index()];
            for (index, spec) in specs.iter().enumerate() {
                if spec.name.is_empty() {
                    return Err(CatalogError::EmptyName { ty, index });
                }
                if spec.default.tag() != ty.tag() {
                    return Err(CatalogError::TagMismatch {
                        ty,
                        name: spec.name.clone(),
                    });
                }
                if specs[..index].iter().any(|prev| prev.name == spec.name) {
                    return Err(CatalogError::DuplicateName {
                        ty,
                        name: spec.name.clone(),
                    });
                }
            }
        }
        Ok(self)
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = DatapointType::ALL
            .iter()
            .map(|ty| format!("{ty:?}={}", self.datapoint_count(*ty)))
            .collect();
        write!(f, "Catalog[{}]", counts.join(", "))
    }
}

/// Builder for assembling a [`Catalog`] in code.
///
/// Entries are appended in index order; `build()` runs the same
/// validation as TOML loading.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    tables: [Vec<DatapointSpec>; TYPE_COUNT],
}

impl CatalogBuilder {
    /// Append a datapoint to a type's table.
    pub fn datapoint(
        mut self,
        ty: DatapointType,
        name: &str,
        flags: DatapointFlags,
        default: Value,
    ) -> Self {
        self.tables[ty.index()].push(DatapointSpec {
            name: name.to_string(),
            flags,
            default,
        });
        self
    }

    /// Validate and produce the catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        Catalog {
            tables: self.tables,
        }
        .validate()
    }
}

// ─── TOML Schema ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    binary: Vec<RawBoolEntry>,
    #[serde(default)]
    button: Vec<RawUintEntry>,
    #[serde(default)]
    float: Vec<RawFloatEntry>,
    #[serde(default)]
    int: Vec<RawIntEntry>,
    #[serde(default)]
    multi_state: Vec<RawUintEntry>,
    #[serde(default)]
    uint: Vec<RawUintEntry>,
}

#[derive(Debug, Deserialize)]
struct RawBoolEntry {
    name: String,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    nvm: bool,
}

#[derive(Debug, Deserialize)]
struct RawUintEntry {
    name: String,
    #[serde(default)]
    default: u32,
    #[serde(default)]
    nvm: bool,
}

#[derive(Debug, Deserialize)]
struct RawFloatEntry {
    name: String,
    #[serde(default)]
    default: f32,
    #[serde(default)]
    nvm: bool,
}

#[derive(Debug, Deserialize)]
struct RawIntEntry {
    name: String,
    #[serde(default)]
    default: i32,
    #[serde(default)]
    nvm: bool,
}

fn entry_flags(nvm: bool) -> DatapointFlags {
    if nvm {
        DatapointFlags::NVM
    } else {
        DatapointFlags::empty()
    }
}

impl RawCatalog {
    fn into_catalog(self) -> Result<Catalog, CatalogError> {
        let mut tables: [Vec<DatapointSpec>; TYPE_COUNT] = Default::default();

        tables[DatapointType::Binary.index()] = self
            .binary
            .into_iter()
            .map(|e| DatapointSpec {
                name: e.name,
                flags: entry_flags(e.nvm),
                default: Value::Uint(u32::from(e.default)),
            })
            .collect();
        tables[DatapointType::Button.index()] = uint_specs(self.button);
        tables[DatapointType::Float.index()] = self
            .float
            .into_iter()
            .map(|e| DatapointSpec {
                name: e.name,
                flags: entry_flags(e.nvm),
                default: Value::Float(e.default),
            })
            .collect();
        tables[DatapointType::Int.index()] = self
            .int
            .into_iter()
            .map(|e| DatapointSpec {
                name: e.name,
                flags: entry_flags(e.nvm),
                default: Value::Int(e.default),
            })
            .collect();
        tables[DatapointType::MultiState.index()] = uint_specs(self.multi_state);
        tables[DatapointType::Uint.index()] = uint_specs(self.uint);

        Catalog { tables }.validate()
    }
}

fn uint_specs(entries: Vec<RawUintEntry>) -> Vec<DatapointSpec> {
    entries
        .into_iter()
        .map(|e| DatapointSpec {
            name: e.name,
            flags: entry_flags(e.nvm),
            default: Value::Uint(e.default),
        })
        .collect()
}
