// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deterministic resource id allocation.
//!
//! Computes the CPU affinities handed to server workers and the
//! shared-memory offsets handed to application slots. There is no registry:
//! every id is a function of `(index, stride)`, so two processes started
//! from the same inputs agree on the layout without talking to each other.

use serde::Serialize;

use crate::error::AllocationError;
use crate::types::MAX_CORE_ID;

/// Largest worker or app-slot count a single allocation accepts.
pub const MAX_SLOTS: u32 = 1024;

/// Paired CPU affinities and shared-memory offsets for one server run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceIdSpace {
    core_affinity: Vec<u32>,
    shm_offsets: Vec<u32>,
    shm_stride: u32,
}

impl ResourceIdSpace {
    /// 1-based cores for the server workers, in worker order.
    pub fn core_affinity(&self) -> &[u32] {
        &self.core_affinity
    }

    /// Base shared-memory offset of every app slot, in slot order.
    pub fn shm_offsets(&self) -> &[u32] {
        &self.shm_offsets
    }

    /// Stride between consecutive offsets.
    pub fn shm_stride(&self) -> u32 {
        self.shm_stride
    }

    /// Number of server workers this space was sized for.
    pub fn num_workers(&self) -> u32 {
        self.core_affinity.len() as u32
    }

    /// Number of app slots this space was sized for.
    pub fn num_apps(&self) -> u32 {
        self.shm_offsets.len() as u32
    }

    /// Keys an application in `slot` registers under: its own position
    /// inside every offset block. Lists for distinct slots never overlap
    /// because `slot < num_apps <= stride`.
    pub fn slot_key_list(&self, slot: u32) -> Option<Vec<u32>> {
        if slot >= self.num_apps() {
            return None;
        }
        Some(self.shm_offsets.iter().map(|offset| offset + slot).collect())
    }

    /// Comma-joined affinity list, as the server expects it on argv.
    pub fn affinity_arg(&self) -> String {
        join_ids(&self.core_affinity)
    }

    /// Comma-joined offset list, as the server expects it on argv.
    pub fn offsets_arg(&self) -> String {
        join_ids(&self.shm_offsets)
    }
}

/// Allocate affinities and offsets for `num_workers` server workers and
/// `num_apps` application slots.
///
/// Worker `j` gets core `core_base + j + 1`; app slot `k` gets offset
/// `k * shm_stride + 1`. A stride smaller than the number of app slots
/// would let slot key lists bleed into the next block, so it is rejected.
pub fn allocate(
    num_workers: u32,
    num_apps: u32,
    core_base: u32,
    shm_stride: u32,
) -> Result<ResourceIdSpace, AllocationError> {
    check_count("num_workers", num_workers)?;
    check_count("num_apps", num_apps)?;

    if shm_stride < num_apps {
        return Err(AllocationError::StrideTooSmall {
            stride: shm_stride,
            apps: num_apps,
        });
    }

    let last_core = core_base
        .checked_add(num_workers)
        .ok_or(AllocationError::Overflow {
            what: "core_affinity",
        })?;
    if last_core > MAX_CORE_ID {
        return Err(AllocationError::TooMany {
            what: "core_affinity",
            count: last_core,
            max: MAX_CORE_ID,
        });
    }

    // Highest key any slot can produce: last block base + last slot.
    (num_apps - 1)
        .checked_mul(shm_stride)
        .and_then(|base| base.checked_add(num_apps))
        .ok_or(AllocationError::Overflow {
            what: "shm_offsets",
        })?;

    let core_affinity = (0..num_workers).map(|j| core_base + j + 1).collect();
    let shm_offsets = (0..num_apps).map(|k| k * shm_stride + 1).collect();

    Ok(ResourceIdSpace {
        core_affinity,
        shm_offsets,
        shm_stride,
    })
}

fn check_count(what: &'static str, count: u32) -> Result<(), AllocationError> {
    if count == 0 {
        return Err(AllocationError::ZeroCount { what });
    }
    if count > MAX_SLOTS {
        return Err(AllocationError::TooMany {
            what,
            count,
            max: MAX_SLOTS,
        });
    }
    Ok(())
}

/// Join ids with commas, the list format used on every command line here.
pub fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
