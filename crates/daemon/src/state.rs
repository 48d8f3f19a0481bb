// SPDX-License-Identifier: MIT

//! Shared state threaded through every axum handler.

use crate::queue::RequestQueue;
use oxhv_adapters::{ExportSink, ProjectSelector, RequestTransformer};
use oxhv_config::HypervisorConfig;
use oxhv_engine::LifecycleManager;
use oxhv_storage::StateManager;
use std::sync::Arc;

/// The pluggable capabilities a caller of [`crate::server::run`] may inject
/// at startup, per the Design Notes' guidance to model dynamic callback
/// fields as trait objects rather than closures captured on the process
/// heap. Every field is optional: absent means "use the declarative/default
/// behavior" for that concern.
#[derive(Default, Clone)]
pub struct AppCapabilities {
    pub selector: Option<Arc<dyn ProjectSelector>>,
    pub transformer: Option<Arc<dyn RequestTransformer>>,
    pub sink: Option<Arc<dyn ExportSink>>,
}

/// Everything a handler needs to serve one request: configuration, the
/// process-wide state manager, the lifecycle manager (spawn/restart/wait),
/// the per-project request queue, and the optional injected capabilities.
pub struct AppState {
    pub config: Arc<HypervisorConfig>,
    pub state: Arc<StateManager>,
    pub lifecycle: Arc<LifecycleManager>,
    pub queue: Arc<RequestQueue>,
    pub capabilities: AppCapabilities,
    /// Connection-pooled client shared by the readiness probe's sibling
    /// uses: proxied dispatch and the dev-proxy web handler.
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<HypervisorConfig>,
        state: Arc<StateManager>,
        lifecycle: Arc<LifecycleManager>,
        capabilities: AppCapabilities,
    ) -> Self {
        let queue = Arc::new(RequestQueue::new(config.queue.max_items));
        Self {
            config,
            state,
            lifecycle,
            queue,
            capabilities,
            http_client: reqwest::Client::new(),
        }
    }
}
