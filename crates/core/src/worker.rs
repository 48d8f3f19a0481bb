// SPDX-License-Identifier: MIT

//! `WorkerHandle`: the plain data describing a spawned worker.
//!
//! This crate never holds the actual `tokio::process::Child` — process
//! ownership lives in `oxhv-engine`'s `PoolEntry`, which wraps a
//! `WorkerHandle` together with the handle to the running process. Keeping
//! the data shape here lets `oxhv-storage` and `oxhv-daemon` reason about a
//! worker's port and identity without depending on tokio.

use serde::{Deserialize, Serialize};

/// Port and process identity of a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub port: u16,
    /// OS process id, once known. `None` only in the brief window between
    /// a successful port bind and the subprocess actually starting.
    pub pid: Option<u32>,
}

impl WorkerHandle {
    pub fn new(port: u16, pid: Option<u32>) -> Self {
        Self { port, pid }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}
