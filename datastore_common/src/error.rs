//! Error taxonomy for datastore operations.
//!
//! Every failure is reported to the immediate caller as one of these
//! kinds; none are retried internally. [`Error::code`] renders the
//! numeric status visible at the API boundary (the shell layer is
//! responsible for printing it).

use thiserror::Error;

use crate::types::DatapointType;

/// Errors returned by datastore operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Operation on a type whose subscriber table was never allocated,
    /// or on a datastore whose worker is gone.
    #[error("{what} not initialized")]
    NotInitialized {
        /// Which resource was missing.
        what: &'static str,
    },

    /// Empty buffer, zero count, or a value whose tag does not match
    /// the datapoint type.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was malformed.
        reason: &'static str,
    },

    /// `start_id + count` exceeds the type's datapoint count.
    #[error("range {start_id}+{count} exceeds {ty:?} datapoint count {limit}")]
    OutOfRange {
        /// Affected datapoint type.
        ty: DatapointType,
        /// First datapoint id of the operation.
        start_id: u32,
        /// Number of datapoints in the operation.
        count: usize,
        /// Datapoint count of the type.
        limit: usize,
    },

    /// Subscriber table full or buffer pool exhausted.
    #[error("no space: {what}")]
    NoSpace {
        /// Which bounded resource ran out.
        what: &'static str,
    },

    /// Request channel full on non-blocking submit. Retryable.
    #[error("request queue full")]
    ResourceBusy,

    /// Response channel wait exceeded its deadline.
    #[error("response wait timed out after {timeout_ms} ms")]
    Timeout {
        /// Deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Pause/unpause referencing a callback no subscription carries.
    #[error("no subscription matches the given callback")]
    NotFound,

    /// Message kind outside the closed request set. The Rust request
    /// enum cannot represent such a kind, but the code stays in the
    /// numeric status set for the decode boundary.
    #[error("unsupported request kind {kind}")]
    Unsupported {
        /// Raw kind value that failed to decode.
        kind: u8,
    },
}

impl Error {
    /// Numeric status code, errno-flavored and negative, mirroring
    /// what the firmware API surfaces to the shell layer.
    pub const fn code(&self) -> i32 {
        match self {
            Self::NotInitialized { .. } => -13,  // EACCES
            Self::InvalidArgument { .. } => -22, // EINVAL
            Self::OutOfRange { .. } => -34,      // ERANGE
            Self::NoSpace { .. } => -28,         // ENOSPC
            Self::ResourceBusy => -16,           // EBUSY
            Self::Timeout { .. } => -110,        // ETIMEDOUT
            Self::NotFound => -3,                // ESRCH
            Self::Unsupported { .. } => -95,     // EOPNOTSUPP
        }
    }
}

/// Result alias for datastore operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;
