// SPDX-License-Identifier: MIT

//! `PoolEntry`: a project's live worker, exclusively owned.
//!
//! The subprocess handle lives here, not in `oxhv-core`, because only this
//! crate's `StateManager` (under its lock) ever reaches across a blue/green
//! swap to hand one `PoolEntry` off in exchange for another. Nothing else in
//! the workspace holds a `tokio::process::Child` directly.

use crate::picker::{Picker, SingleWorkerPicker};
use oxhv_core::WorkerHandle;
use tokio::process::Child;

#[derive(Debug)]
pub struct PoolEntry {
    pub handle: WorkerHandle,
    pub child: Child,
    picker: SingleWorkerPicker,
}

impl PoolEntry {
    pub fn new(handle: WorkerHandle, child: Child) -> Self {
        Self {
            handle,
            child,
            picker: SingleWorkerPicker::new(handle),
        }
    }

    pub fn pick(&self) -> Option<WorkerHandle> {
        self.picker.pick()
    }

    /// Best-effort PID read, refreshed from the live child in case the
    /// handle was constructed before the OS assigned one.
    pub fn pid(&self) -> Option<u32> {
        self.child.id().or(self.handle.pid)
    }
}
