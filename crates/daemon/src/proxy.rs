// SPDX-License-Identifier: MIT

//! The Proxy (specification §4.5): forward a routed request to the chosen
//! worker, attach forwarded headers, tee the response body purely to
//! observe completion for inflight accounting, and auto-heal on upstream
//! transport failure by restarting the project and re-dispatching once.

use crate::queue::{BufferedRequest, QueueOutcome};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{Stream, TryStreamExt};
use oxhv_core::{HypervisorError, ProjectName, RequestId, SelectedProject};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

/// Auto-heal retries at most once per original failure (specification §9
/// Open Question: no explicit cap is named, resolved here as a single
/// restart-and-retry before giving up).
const MAX_AUTO_HEAL_RETRIES: u8 = 1;

/// Hop-by-hop headers that describe connection state between the public
/// listener and one hop, never forwarded to the worker.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Attach the `x-forwarded-*` and `x-oxian-project` headers described in
/// the specification's External Interfaces section, plus a request-id
/// header when `proxy.passRequestId` is set and the caller didn't already
/// supply one.
fn add_forwarded_headers(
    headers: &mut HeaderMap,
    project: &ProjectName,
    path: &str,
    query: &str,
    server_port: u16,
    pass_request_id: bool,
    request_id_header: &str,
) {
    let insert = |headers: &mut HeaderMap, name: &str, value: &str| {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    };
    insert(headers, "x-forwarded-proto", "http");
    insert(headers, "x-forwarded-host", "127.0.0.1");
    insert(headers, "x-forwarded-port", &server_port.to_string());
    insert(headers, "x-forwarded-path", path);
    insert(headers, "x-forwarded-query", query);
    insert(headers, "x-oxian-project", project.as_str());

    if pass_request_id {
        let already_present = HeaderName::try_from(request_id_header)
            .ok()
            .and_then(|name| headers.get(name))
            .is_some();
        if !already_present {
            insert(headers, request_id_header, RequestId::generate().as_str());
        }
    }
}

/// Dispatch a request whose project already has a ready worker, streaming
/// both the request and response bodies through without buffering. Auto-
/// heal still restarts the project on a transport error, but a streamed
/// request's body may already be partially consumed, so it is never
/// retried here — the client sees the error and may retry itself.
pub async fn dispatch_ready(state: &Arc<AppState>, selected: &SelectedProject, req: axum::extract::Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    add_forwarded_headers(
        &mut headers,
        &selected.project,
        &path,
        &query,
        state.config.server.port,
        state.config.proxy.pass_request_id,
        &state.config.logging.request_id_header,
    );

    let path_and_query = if query.is_empty() { path } else { format!("{path}?{query}") };
    let stream = body
        .into_data_stream()
        .map_err(|err| -> Box<dyn std::error::Error + Send + Sync> { Box::new(err) });
    let reqwest_body = reqwest::Body::wrap_stream(stream);

    match forward_once(state, &selected.project, parts.method, &path_and_query, headers, reqwest_body).await {
        Ok(response) => response,
        Err(HypervisorError::UpstreamTransport(_)) => {
            warn!(project = %selected.project, "upstream transport error on streamed request, restarting worker");
            let _ = state.lifecycle.restart(selected).await;
            crate::response::error_response(&HypervisorError::UpstreamTransport(
                "worker connection reset".to_string(),
            ))
        }
        Err(err) => crate::response::error_response(&err),
    }
}

/// Dispatch a fully-buffered request directly, rendering any error as a
/// JSON response. Used by the web handler's API fall-through path, where
/// the body was already read into memory for MIME/static-file routing
/// decisions before the worker was known to be ready.
pub async fn dispatch_buffered_response(state: &Arc<AppState>, selected: &SelectedProject, buffered: BufferedRequest) -> Response {
    match dispatch_with_retries(state, selected, buffered, MAX_AUTO_HEAL_RETRIES).await {
        Ok(response) => response,
        Err(err) => crate::response::error_response(&err),
    }
}

/// Dispatch a buffered request as the `dispatch` callback passed to
/// [`crate::queue::RequestQueue::flush`]: the call itself performs the
/// forward, so the queue's FIFO loop establishes dispatch order, and the
/// resulting [`QueueOutcome`] is handed straight back to the original
/// caller's `enqueue_and_wait` future via the queue's oneshot channel.
pub async fn dispatch_buffered_outcome(state: Arc<AppState>, selected: SelectedProject, buffered: BufferedRequest) -> QueueOutcome {
    match dispatch_with_retries(&state, &selected, buffered, MAX_AUTO_HEAL_RETRIES).await {
        Ok(response) => QueueOutcome::Dispatch(response),
        Err(err) => QueueOutcome::Failed(err),
    }
}

async fn dispatch_with_retries(
    state: &Arc<AppState>,
    selected: &SelectedProject,
    buffered: BufferedRequest,
    retries_left: u8,
) -> Result<Response, HypervisorError> {
    let mut headers = buffered.headers.clone();
    strip_hop_by_hop(&mut headers);
    let (path, query) = buffered.path_and_query.split_once('?').unwrap_or((buffered.path_and_query.as_str(), ""));
    add_forwarded_headers(
        &mut headers,
        &selected.project,
        path,
        query,
        state.config.server.port,
        state.config.proxy.pass_request_id,
        &state.config.logging.request_id_header,
    );

    let body = reqwest::Body::from(buffered.body.clone());
    match forward_once(state, &selected.project, buffered.method.clone(), &buffered.path_and_query, headers, body).await {
        Ok(response) => Ok(response),
        Err(HypervisorError::UpstreamTransport(message)) if retries_left > 0 => {
            warn!(project = %selected.project, "upstream transport error, auto-healing and retrying once");
            if state.lifecycle.restart(selected).await.is_err() {
                return Err(HypervisorError::UpstreamTransport(message));
            }
            Box::pin(dispatch_with_retries(state, selected, buffered, retries_left - 1)).await
        }
        Err(err) => Err(err),
    }
}

async fn forward_once(
    state: &Arc<AppState>,
    project: &ProjectName,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: reqwest::Body,
) -> Result<Response, HypervisorError> {
    let handle = state.state.pick(project).ok_or(HypervisorError::NoWorkerAvailable)?;
    let url = format!("{}{}", handle.base_url(), path_and_query);

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut reqwest_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            reqwest_headers.insert(name, value);
        }
    }

    state.state.incr_inflight(project);
    touch_active(state, project);

    let result = state
        .http_client
        .request(reqwest_method, &url)
        .headers(reqwest_headers)
        .body(body)
        .timeout(Duration::from_millis(state.config.proxy.timeout_ms))
        .send()
        .await;

    let upstream = match result {
        Ok(response) => response,
        Err(err) => {
            state.state.decr_inflight(project);
            touch_active(state, project);
            return Err(HypervisorError::UpstreamTransport(err.to_string()));
        }
    };

    Ok(render_response(state, project, upstream))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn touch_active(state: &Arc<AppState>, project: &ProjectName) {
    state.state.touch_active(project, now_ms());
}

/// Build the client-facing `Response`, preserving upstream status/headers
/// verbatim (redirects pass through unfollowed). An empty body decrements
/// inflight immediately and skips the tee; otherwise the body is wrapped so
/// inflight decrements exactly once, whether the stream finishes, errors,
/// or is dropped mid-flight by client cancellation.
fn render_response(state: &Arc<AppState>, project: &ProjectName, upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers().iter() {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_bytes(value.as_bytes())) {
            response_headers.insert(name, value);
        }
    }

    let is_empty = matches!(upstream.content_length(), Some(0));
    let guard = InflightGuard::new(Arc::clone(&state.state), project.clone());

    let body = if is_empty {
        guard.complete();
        Body::empty()
    } else {
        let stream = upstream.bytes_stream().map_err(axum::Error::new);
        Body::from_stream(TeeBody { inner: Box::pin(stream), guard: Some(guard) })
    };

    let mut response = (status, body).into_response();
    *response.headers_mut() = response_headers;
    response
}

/// Decrements a project's inflight counter exactly once, whichever of
/// "stream ended", "stream errored", or "stream dropped without finishing"
/// (client cancellation) happens first.
struct InflightGuard {
    state: Arc<oxhv_storage::StateManager>,
    project: ProjectName,
    done: Arc<AtomicBool>,
}

impl InflightGuard {
    fn new(state: Arc<oxhv_storage::StateManager>, project: ProjectName) -> Self {
        Self { state, project, done: Arc::new(AtomicBool::new(false)) }
    }

    fn complete(&self) {
        if self.done.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            self.state.decr_inflight(&self.project);
            self.state.touch_active(&self.project, now_ms());
            debug!(project = %self.project, "inflight decremented");
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.complete();
    }
}

type BoxedByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, axum::Error>> + Send>>;

/// Wraps a response body stream purely to observe its completion for
/// inflight accounting; the bytes pass through unchanged. The boxed inner
/// stream is already `Unpin`, so this needs no manual pin-projection.
struct TeeBody {
    inner: BoxedByteStream,
    guard: Option<InflightGuard>,
}

impl Stream for TeeBody {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_next(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            if let Some(guard) = this.guard.take() {
                guard.complete();
            }
        }
        poll
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue as HV;

    #[test]
    fn forwarded_headers_carry_project_and_path() {
        let mut headers = HeaderMap::new();
        add_forwarded_headers(&mut headers, &ProjectName::new("alpha"), "/a", "b=1", 8080, false, "x-request-id");
        assert_eq!(headers.get("x-oxian-project"), Some(&HV::from_static("alpha")));
        assert_eq!(headers.get("x-forwarded-path"), Some(&HV::from_static("/a")));
        assert_eq!(headers.get("x-forwarded-port"), Some(&HV::from_static("8080")));
        assert!(headers.get("x-request-id").is_none());
    }

    #[test]
    fn pass_request_id_generates_one_when_absent() {
        let mut headers = HeaderMap::new();
        add_forwarded_headers(&mut headers, &ProjectName::new("alpha"), "/a", "", 8080, true, "x-request-id");
        assert!(headers.get("x-request-id").is_some());
    }

    #[test]
    fn pass_request_id_respects_an_existing_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HV::from_static("client-supplied"));
        add_forwarded_headers(&mut headers, &ProjectName::new("alpha"), "/a", "", 8080, true, "x-request-id");
        assert_eq!(headers.get("x-request-id"), Some(&HV::from_static("client-supplied")));
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HV::from_static("keep-alive"));
        headers.insert("host", HV::from_static("example.com"));
        headers.insert("content-type", HV::from_static("application/json"));
        strip_hop_by_hop(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("host").is_none());
        assert!(headers.get("content-type").is_some());
    }
}
