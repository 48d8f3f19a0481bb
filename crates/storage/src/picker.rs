// SPDX-License-Identifier: MIT

//! Worker selection within a pool.
//!
//! A project's `PoolEntry` currently holds exactly one worker, but the
//! picker is a trait so a future multi-worker-per-project pool can swap in
//! a round-robin or least-inflight strategy without touching `StateManager`
//! or its callers.

use oxhv_core::WorkerHandle;
use std::fmt;

pub trait Picker: fmt::Debug + Send + Sync {
    /// Choose a worker to dispatch a request to, if any is available.
    fn pick(&self) -> Option<WorkerHandle>;
}

#[derive(Debug, Clone, Copy)]
pub struct SingleWorkerPicker {
    handle: WorkerHandle,
}

impl SingleWorkerPicker {
    pub fn new(handle: WorkerHandle) -> Self {
        Self { handle }
    }
}

impl Picker for SingleWorkerPicker {
    fn pick(&self) -> Option<WorkerHandle> {
        Some(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_picker_always_returns_its_handle() {
        let handle = WorkerHandle::new(9001, Some(42));
        let picker = SingleWorkerPicker::new(handle);
        assert_eq!(picker.pick(), Some(handle));
        assert_eq!(picker.pick(), Some(handle));
    }
}
