// SPDX-License-Identifier: MIT

//! Wiring the public listener, the optional OTLP listener, the idle
//! reaper, and the hot-reload watcher into one running hypervisor.
//!
//! Everything upstream of this module is either pure domain logic
//! (`oxhv-core`, `oxhv-config`) or a component that knows how to do one
//! thing (build a router, run a reap pass, watch a directory). `run` is
//! the one place that starts all of it and waits for a shutdown signal.

use crate::state::{AppCapabilities, AppState};
use crate::{otlp, router};
use oxhv_config::HypervisorConfig;
use oxhv_engine::LifecycleManager;
use oxhv_storage::StateManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Handles to every background task `run` started, kept so a caller (tests,
/// or a future supervisor embedding the hypervisor as a library) can await
/// or abort them explicitly rather than relying solely on process exit.
pub struct ServerHandles {
    pub public: JoinHandle<std::io::Result<()>>,
    pub otlp: Option<JoinHandle<std::io::Result<()>>>,
    pub reaper: JoinHandle<()>,
    pub watcher: Option<(notify::RecommendedWatcher, JoinHandle<()>)>,
}

impl ServerHandles {
    /// Wait for the public listener to finish (normally only on a fatal
    /// bind/accept error, since `run` does not install its own shutdown
    /// trigger beyond what the caller awaits on).
    pub async fn join_public(self) -> std::io::Result<()> {
        self.public.await.unwrap_or_else(|err| {
            Err(std::io::Error::other(format!("public listener task panicked: {err}")))
        })
    }
}

/// Start the hypervisor: bind the public listener (and, if configured, the
/// OTLP listener), spawn the idle reaper and — when `runtime.hot_reload` is
/// set — the hot-reload watcher rooted at `projects_root`.
///
/// `capabilities` carries the optional injected `ProjectSelector` /
/// `RequestTransformer` / `ExportSink` trait objects (specification's
/// Design Notes: dynamic callback fields modeled as trait objects, supplied
/// by the embedding caller rather than parsed from config).
pub async fn run(
    config: Arc<HypervisorConfig>,
    projects_root: PathBuf,
    capabilities: AppCapabilities,
) -> std::io::Result<ServerHandles> {
    let state = Arc::new(StateManager::new());
    let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&config), Arc::clone(&state), projects_root.clone()));
    let app_state = Arc::new(AppState::new(Arc::clone(&config), Arc::clone(&state), Arc::clone(&lifecycle), capabilities));

    let public_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let public_listener = tokio::net::TcpListener::bind(public_addr).await?;
    info!(addr = %public_addr, "public listener bound");
    let public_router = router::build_router(Arc::clone(&app_state));
    let public = tokio::spawn(async move { axum::serve(public_listener, public_router).await });

    let otlp_handle = match &config.otlp {
        Some(otlp_config) => {
            let otlp_addr = SocketAddr::from(([0, 0, 0, 0], otlp_config.port));
            let otlp_listener = tokio::net::TcpListener::bind(otlp_addr).await?;
            info!(addr = %otlp_addr, "otlp listener bound");
            let otlp_router = otlp::build_otlp_router(Arc::clone(&app_state));
            Some(tokio::spawn(async move { axum::serve(otlp_listener, otlp_router).await }))
        }
        None => None,
    };

    let reaper = oxhv_engine::spawn_background(Arc::clone(&config), Arc::clone(&state), oxhv_core::SystemClock);

    let watcher = if config.runtime.hot_reload {
        crate::watcher::spawn_hot_reload(&projects_root, config.runtime.watcher_debounce_ms, Arc::clone(&lifecycle))
    } else {
        None
    };

    Ok(ServerHandles { public, otlp: otlp_handle, reaper, watcher })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_binds_an_ephemeral_public_port_and_no_otlp_listener_by_default() {
        let mut config = HypervisorConfig::default();
        config.server.port = 0;
        let config = Arc::new(config);

        let dir = tempfile::tempdir().expect("tempdir");
        let handles = run(config, dir.path().to_path_buf(), AppCapabilities::default()).await.expect("run");
        assert!(handles.otlp.is_none());
        assert!(handles.watcher.is_none());
        handles.public.abort();
        handles.reaper.abort();
    }

    #[tokio::test]
    async fn run_binds_the_otlp_listener_when_configured() {
        let mut config = HypervisorConfig::default();
        config.server.port = 0;
        config.otlp = Some(oxhv_config::OtlpConfig { port: 0, path_prefix: "/v1".to_string(), upstream: None });
        let config = Arc::new(config);

        let dir = tempfile::tempdir().expect("tempdir");
        let handles = run(config, dir.path().to_path_buf(), AppCapabilities::default()).await.expect("run");
        assert!(handles.otlp.is_some());
        handles.public.abort();
        if let Some(otlp) = handles.otlp {
            otlp.abort();
        }
        handles.reaper.abort();
    }
}
