// SPDX-License-Identifier: MIT

//! The engine's own error taxonomy, converging into `HypervisorError` at the
//! call sites that report failures upward (per-component errors stay
//! specific as long as possible, per the workspace's convention).

use oxhv_adapters::ResolverError;
use oxhv_core::HypervisorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no free port found starting at {base}")]
    PortExhausted { base: u16 },

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("materialize phase failed: {0}")]
    Materialize(String),

    #[error("prepare phase failed: {0}")]
    Prepare(String),

    #[error("worker process failed to start: {0}")]
    Spawn(std::io::Error),
}

impl From<EngineError> for HypervisorError {
    fn from(err: EngineError) -> Self {
        HypervisorError::SpawnFatal(err.to_string())
    }
}
