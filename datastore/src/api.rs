//! Typed API front-ends.
//!
//! Thin wrappers over the generic read/write path: validate the
//! caller's slice, stage a pooled buffer, marshal to and from the
//! tagged value representation, and delegate to the request channel.
//! They add no concurrency behavior of their own.
//!
//! Each type offers an acknowledged write (`write_*`, blocks for the
//! worker's status) and a fire-and-forget post (`post_*`, returns once
//! the message is accepted).

use std::sync::mpsc;

use common::error::{Error, Result};
use common::types::{DatapointType, Value};

use crate::service::{Datastore, Request};

impl Datastore {
    // ─── Float ──────────────────────────────────────────────────────

    /// Read float datapoints starting at `start_id`.
    pub fn read_float(&self, start_id: u32, out: &mut [f32]) -> Result<()> {
        self.read_marshal(DatapointType::Float, start_id, out, Value::as_f32)
    }

    /// Write float datapoints and wait for the worker's status.
    pub fn write_float(&self, start_id: u32, values: &[f32]) -> Result<()> {
        self.write_marshal(DatapointType::Float, start_id, values, Value::Float, true)
    }

    /// Fire-and-forget float write.
    pub fn post_float(&self, start_id: u32, values: &[f32]) -> Result<()> {
        self.write_marshal(DatapointType::Float, start_id, values, Value::Float, false)
    }

    // ─── Uint ───────────────────────────────────────────────────────

    /// Read unsigned integer datapoints starting at `start_id`.
    pub fn read_uint(&self, start_id: u32, out: &mut [u32]) -> Result<()> {
        self.read_marshal(DatapointType::Uint, start_id, out, Value::as_u32)
    }

    /// Write unsigned integer datapoints and wait for the status.
    pub fn write_uint(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::Uint, start_id, values, Value::Uint, true)
    }

    /// Fire-and-forget unsigned integer write.
    pub fn post_uint(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::Uint, start_id, values, Value::Uint, false)
    }

    // ─── Int ────────────────────────────────────────────────────────

    /// Read signed integer datapoints starting at `start_id`.
    pub fn read_int(&self, start_id: u32, out: &mut [i32]) -> Result<()> {
        self.read_marshal(DatapointType::Int, start_id, out, Value::as_i32)
    }

    /// Write signed integer datapoints and wait for the status.
    pub fn write_int(&self, start_id: u32, values: &[i32]) -> Result<()> {
        self.write_marshal(DatapointType::Int, start_id, values, Value::Int, true)
    }

    /// Fire-and-forget signed integer write.
    pub fn post_int(&self, start_id: u32, values: &[i32]) -> Result<()> {
        self.write_marshal(DatapointType::Int, start_id, values, Value::Int, false)
    }

    // ─── Binary ─────────────────────────────────────────────────────

    /// Read binary datapoints starting at `start_id`.
    pub fn read_binary(&self, start_id: u32, out: &mut [bool]) -> Result<()> {
        self.read_marshal(DatapointType::Binary, start_id, out, |v| {
            v.as_u32().map(|u| u != 0)
        })
    }

    /// Write binary datapoints and wait for the status.
    pub fn write_binary(&self, start_id: u32, values: &[bool]) -> Result<()> {
        self.write_marshal(
            DatapointType::Binary,
            start_id,
            values,
            |b| Value::Uint(u32::from(b)),
            true,
        )
    }

    /// Fire-and-forget binary write.
    pub fn post_binary(&self, start_id: u32, values: &[bool]) -> Result<()> {
        self.write_marshal(
            DatapointType::Binary,
            start_id,
            values,
            |b| Value::Uint(u32::from(b)),
            false,
        )
    }

    // ─── Button ─────────────────────────────────────────────────────

    /// Read button datapoints starting at `start_id`.
    pub fn read_button(&self, start_id: u32, out: &mut [u32]) -> Result<()> {
        self.read_marshal(DatapointType::Button, start_id, out, Value::as_u32)
    }

    /// Write button datapoints and wait for the status.
    pub fn write_button(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::Button, start_id, values, Value::Uint, true)
    }

    /// Fire-and-forget button write.
    pub fn post_button(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::Button, start_id, values, Value::Uint, false)
    }

    // ─── Multi-state ────────────────────────────────────────────────

    /// Read multi-state datapoints starting at `start_id`.
    pub fn read_multi_state(&self, start_id: u32, out: &mut [u32]) -> Result<()> {
        self.read_marshal(DatapointType::MultiState, start_id, out, Value::as_u32)
    }

    /// Write multi-state datapoints and wait for the status.
    pub fn write_multi_state(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::MultiState, start_id, values, Value::Uint, true)
    }

    /// Fire-and-forget multi-state write.
    pub fn post_multi_state(&self, start_id: u32, values: &[u32]) -> Result<()> {
        self.write_marshal(DatapointType::MultiState, start_id, values, Value::Uint, false)
    }

    // ─── Marshaling helpers ─────────────────────────────────────────

    pub(crate) fn read_marshal<T: Copy>(
        &self,
        ty: DatapointType,
        start_id: u32,
        out: &mut [T],
        from_value: fn(Value) -> Option<T>,
    ) -> Result<()> {
        if out.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "read buffer must be nonempty",
            });
        }
        let count = out.len();
        let lease = self.acquire_lease(count)?;
        let (resp_tx, resp_rx) = mpsc::sync_channel(1);
        self.submit(Request::Read {
            ty,
            start_id,
            count,
            lease,
            respond_to: resp_tx,
        })?;
        let response = self.await_response(&resp_rx)?;
        let mut status = response.status;
        if let Some(lease) = response.lease {
            if status.is_ok() {
                for (dst, value) in out.iter_mut().zip(&lease.values()[..count]) {
                    match from_value(*value) {
                        Some(v) => *dst = v,
                        None => {
                            status = Err(Error::InvalidArgument {
                                reason: "stored value tag does not match datapoint type",
                            });
                            break;
                        }
                    }
                }
            }
            self.pool().release(lease)?;
        }
        status
    }

    pub(crate) fn write_marshal<T: Copy>(
        &self,
        ty: DatapointType,
        start_id: u32,
        values: &[T],
        to_value: fn(T) -> Value,
        acknowledged: bool,
    ) -> Result<()> {
        if values.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "write values must be nonempty",
            });
        }
        let count = values.len();
        let mut lease = self.acquire_lease(count)?;
        for (slot, value) in lease.values_mut()[..count].iter_mut().zip(values) {
            *slot = to_value(*value);
        }

        if acknowledged {
            let (resp_tx, resp_rx) = mpsc::sync_channel(1);
            self.submit(Request::Write {
                ty,
                start_id,
                count,
                lease,
                respond_to: Some(resp_tx),
            })?;
            self.await_response(&resp_rx)?.status
        } else {
            self.submit(Request::Write {
                ty,
                start_id,
                count,
                lease,
                respond_to: None,
            })
        }
    }
}
