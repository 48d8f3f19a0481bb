// SPDX-License-Identifier: MIT

//! OTLP Passthrough (specification §4.7): a second HTTP listener that
//! accepts OTLP HTTP exports from workers, always acknowledges with 202,
//! and optionally forwards upstream or hands the body to an [`ExportSink`].

use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use oxhv_adapters::{OtlpContext, OtlpSignalKind};
use oxhv_core::ProjectName;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Build the standalone OTLP router, mounted under `otlp.path_prefix`
/// (default `/v1`) on the dedicated OTLP listener — a separate `Router`
/// from the public listener's, since the two listen on different ports.
pub fn build_otlp_router(state: Arc<AppState>) -> Router {
    let prefix = state
        .config
        .otlp
        .as_ref()
        .map(|o| o.path_prefix.clone())
        .unwrap_or_else(|| "/v1".to_string());

    Router::new()
        .route(&format!("{prefix}/traces"), post(handle_traces))
        .route(&format!("{prefix}/metrics"), post(handle_metrics))
        .route(&format!("{prefix}/logs"), post(handle_logs))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn handle_traces(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    handle(state, OtlpSignalKind::Traces, headers, body).await
}

async fn handle_metrics(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    handle(state, OtlpSignalKind::Metrics, headers, body).await
}

async fn handle_logs(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    handle(state, OtlpSignalKind::Logs, headers, body).await
}

async fn handle(State(state): State<Arc<AppState>>, kind: OtlpSignalKind, headers: HeaderMap, body: Bytes) -> StatusCode {
    let project = headers
        .get("x-oxian-project")
        .and_then(|v| v.to_str().ok())
        .map(ProjectName::new)
        .unwrap_or_else(ProjectName::default_project);

    let content_type = headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
    let mut header_map = HashMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let ctx = OtlpContext { kind, project, content_type, headers: header_map };

    let should_forward = match &state.capabilities.sink {
        Some(sink) => sink.should_forward(&ctx).await,
        None => true,
    };

    if let Some(sink) = &state.capabilities.sink {
        sink.on_export(&ctx, &body).await;
    }

    if should_forward {
        if let Some(otlp) = &state.config.otlp {
            if let Some(upstream) = &otlp.upstream {
                forward_upstream(&state, upstream, &ctx, body).await;
            }
        }
    }

    StatusCode::ACCEPTED
}

async fn forward_upstream(state: &Arc<AppState>, upstream: &str, ctx: &OtlpContext, body: Bytes) {
    let path = match ctx.kind {
        OtlpSignalKind::Traces => "/v1/traces",
        OtlpSignalKind::Metrics => "/v1/metrics",
        OtlpSignalKind::Logs => "/v1/logs",
    };
    let url = format!("{}{}", upstream.trim_end_matches('/'), path);
    let mut request = state.http_client.post(&url).body(body);
    if let Some(content_type) = &ctx.content_type {
        request = request.header(axum::http::header::CONTENT_TYPE, content_type);
    }
    request = request.header("x-oxian-project", ctx.project.as_str());

    if let Err(err) = request.send().await {
        warn!(upstream = %url, error = %err, "otlp forward failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppCapabilities;
    use oxhv_config::HypervisorConfig;
    use oxhv_engine::LifecycleManager;
    use oxhv_storage::StateManager;
    use std::path::PathBuf;

    fn app_state() -> Arc<AppState> {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&config), Arc::clone(&state), PathBuf::from(".")));
        Arc::new(AppState::new(config, state, lifecycle, AppCapabilities::default()))
    }

    #[tokio::test]
    async fn unconfigured_upstream_still_acks_202() {
        let status = handle(State(app_state()), OtlpSignalKind::Traces, HeaderMap::new(), Bytes::new()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let router = build_otlp_router(app_state());
        let response = tower::ServiceExt::oneshot(
            router,
            axum::http::Request::builder().uri("/v1/not-a-signal").body(axum::body::Body::empty()).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
