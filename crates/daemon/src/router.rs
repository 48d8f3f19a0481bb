// SPDX-License-Identifier: MIT

//! Request routing: the Selector → ready-dispatch-or-queue → Web Handler
//! control flow described in the specification's system overview (§2).

use crate::queue::{buffer_body, BufferedRequest, QueueOutcome};
use crate::select;
use crate::state::AppState;
use crate::{proxy, web};
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use oxhv_adapters::transformer::TransformRequest;
use oxhv_core::{HypervisorError, SelectedProject};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn, Span};

/// Assemble the public listener's router: the admin status endpoint plus a
/// catch-all fallback carrying the full Selector → Web/Queue/Proxy flow.
/// Every request gets a tracing span tagged with method/path/project, in
/// the same "one layer wraps the whole router" shape the corpus's other
/// axum services use for request logging.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/_oxhv/status", get(crate::admin::status))
        .fallback(dispatch)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    tracing::info_span!("request", method = %req.method(), path = %req.uri().path())
                })
                .on_response(|response: &Response, latency: std::time::Duration, span: &Span| {
                    let _guard = span.enter();
                    debug!(status = response.status().as_u16(), latency_ms = latency.as_millis() as u64, "request completed");
                }),
        )
        .with_state(state)
}

async fn dispatch(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let selected = match select::select_project(
        &state.config,
        state.capabilities.selector.as_deref(),
        req.method(),
        req.uri(),
        req.headers(),
    )
    .await
    {
        Ok(selected) => selected,
        Err(err) => return crate::response::error_response(&err),
    };

    if let Some(transformer) = &state.capabilities.transformer {
        if transformer.transform(&to_transform_request(&selected, &req)).await.is_err() {
            return crate::response::error_response(&HypervisorError::TransformationHook);
        }
    }

    let web_config = state.config.projects.get(selected.project.as_str()).and_then(|p| p.web.as_ref());

    // `is_api_path` only returns `false` when a web section exists, so this
    // `if let` always takes the web-handling branch together with a `Some`.
    let req = if let Some(web_config) = web_config.filter(|web| !web::is_api_path(Some(web), req.uri().path())) {
        match web::handle(&state, web_config, req).await {
            Ok(response) => return response,
            Err(req) => req,
        }
    } else {
        req
    };

    route_to_worker(state, selected, req).await
}

fn to_transform_request(selected: &SelectedProject, req: &Request) -> TransformRequest {
    let mut headers = HashMap::with_capacity(req.headers().len());
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    TransformRequest {
        method: req.method().as_str().to_string(),
        path: req.uri().path().to_string(),
        headers,
        project: selected.project.clone(),
    }
}

async fn route_to_worker(state: Arc<AppState>, selected: SelectedProject, req: Request) -> Response {
    if let Err(err) = state.lifecycle.ensure_worker(&selected).await {
        // Per §7 "Spawn fatal": the request still falls through to the
        // queue below, where it will eventually time out with 503; a later
        // request may succeed if the failure was transient (e.g. a
        // recoverable materialize error on retry).
        warn!(project = %selected.project, error = %err, "spawn failed, falling through to queue");
    }

    if state.state.is_ready(&selected.project) {
        return proxy::dispatch_ready(&state, &selected, req).await;
    }

    enqueue_and_flush(state, selected, req).await
}

/// Buffer the request and enqueue it, starting at most one flush-watcher
/// task per project (claimed via [`crate::queue::RequestQueue::claim_flush_watcher`])
/// that dispatches every queued item once the project becomes ready.
async fn enqueue_and_flush(state: Arc<AppState>, selected: SelectedProject, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let (body, truncated) = buffer_body(body, state.config.queue.max_body_bytes).await;
    if truncated {
        debug!(project = %selected.project, "buffered request body truncated at maxBodyBytes");
    }
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let buffered = BufferedRequest { method: parts.method, path_and_query, headers: parts.headers, body, truncated };

    if state.queue.claim_flush_watcher(&selected.project) {
        let flush_state = Arc::clone(&state);
        let flush_selected = selected.clone();
        tokio::spawn(async move {
            let timeout_ms = flush_state.config.proxy.health_timeout_ms;
            if flush_state.lifecycle.wait_for_ready(&flush_selected.project, timeout_ms).await {
                let dispatch_state = Arc::clone(&flush_state);
                let dispatch_selected = flush_selected.clone();
                flush_state
                    .queue
                    .flush(&flush_selected.project, move |item| {
                        let dispatch_state = Arc::clone(&dispatch_state);
                        let dispatch_selected = dispatch_selected.clone();
                        async move { proxy::dispatch_buffered_outcome(dispatch_state, dispatch_selected, item).await }
                    })
                    .await;
            }
            flush_state.queue.release_flush_watcher(&flush_selected.project);
        });
    }

    match state.queue.enqueue_and_wait(&selected.project, buffered, state.config.queue.max_wait_ms).await {
        QueueOutcome::Dispatch(response) => response,
        QueueOutcome::Failed(err) => crate::response::error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_config::WebConfig;

    #[test]
    fn web_config_with_neither_target_nor_dir_has_nothing_to_fall_through_to() {
        // Documents the `unreachable!` above: a `web` section is only ever
        // constructed by config loading with at least one of the two set
        // in a well-formed deployment; both absent is a misconfiguration
        // this router does not attempt to recover from gracefully.
        let web = WebConfig::default();
        assert!(web.dev_proxy_target.is_none() && web.static_dir.is_none());
    }
}
