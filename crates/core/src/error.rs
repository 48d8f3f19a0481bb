// SPDX-License-Identifier: MIT

//! Error taxonomy shared across the hypervisor.
//!
//! Every crate in the workspace defines its own `thiserror` error type scoped
//! to its own concerns (`ConfigError`, `ResolverError`, `SpawnError`, ...).
//! `HypervisorError` is the seam where those all converge on their way to an
//! HTTP response — the public listener is the only place that maps a variant
//! here to a status code and a `{"error":{"message"}}` body.

use thiserror::Error;

/// Error kinds the public HTTP boundary knows how to render.
///
/// This mirrors the error taxonomy in the specification: selection errors
/// become 403, transformation hook errors become 500, upstream/dev-proxy
/// errors become 502, and queue/no-worker conditions become 503.
#[derive(Debug, Error, Clone)]
pub enum HypervisorError {
    #[error("selection failed: {0}")]
    Selection(String),

    #[error("spawn failed: {0}")]
    SpawnFatal(String),

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("server busy")]
    QueueOverflow,

    #[error("queue wait timeout")]
    QueueTimeout,

    #[error("request transformation failed")]
    TransformationHook,

    #[error("no worker available")]
    NoWorkerAvailable,

    #[error("dev proxy error: {0}")]
    DevProxy(String),

    #[error("not found")]
    NotFound,
}

impl HypervisorError {
    /// HTTP status code for this error, per the specification's status code
    /// table.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Selection(_) => 403,
            Self::SpawnFatal(_) => 503,
            Self::UpstreamTransport(_) => 503,
            Self::QueueOverflow | Self::QueueTimeout | Self::NoWorkerAvailable => 503,
            Self::TransformationHook => 500,
            Self::DevProxy(_) => 502,
            Self::NotFound => 404,
        }
    }

    /// The message placed in the `{"error":{"message": ...}}` body.
    ///
    /// Queue errors have fixed, pinned wording (tested at the boundary);
    /// everything else uses the `Display` impl.
    pub fn message(&self) -> String {
        match self {
            Self::QueueOverflow => "Server busy".to_string(),
            Self::QueueTimeout => "Queue wait timeout".to_string(),
            Self::NoWorkerAvailable => "No worker available".to_string(),
            Self::TransformationHook => "Request transformation failed".to_string(),
            other => other.to_string(),
        }
    }
}
