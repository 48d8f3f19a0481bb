// SPDX-License-Identifier: MIT

//! The Web Handler (specification §4.6): for a request whose path does not
//! match the project's API base path, either forward to a configured
//! dev-proxy target, serve a static file (with SPA fallback), or — if
//! neither is configured — fall through to the worker.

use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use oxhv_config::WebConfig;
use oxhv_core::HypervisorError;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Whether `path` belongs to the project's worker-handled API surface (and
/// therefore should never reach the web handler). A project with no `web`
/// section at all has no web handling to speak of, so every path is API.
pub fn is_api_path(web: Option<&WebConfig>, path: &str) -> bool {
    match web {
        Some(web) => path.starts_with(web.api_base_path.as_str()),
        None => true,
    }
}

/// Dispatch a non-API request per the dev-proxy / static-dir / fall-through
/// precedence. Returns `Err(req)` handing the request back, unconsumed,
/// when neither is configured, so the caller can fall through to the
/// worker without having to reconstruct it.
pub async fn handle(state: &AppState, web: &WebConfig, req: axum::extract::Request) -> Result<Response, axum::extract::Request> {
    if let Some(target) = &web.dev_proxy_target {
        return Ok(dev_proxy(state, target, req).await);
    }
    if let Some(static_dir) = &web.static_dir {
        let path = req.uri().path().to_string();
        return Ok(serve_static(static_dir, &path, web.cache_control.as_deref()).await);
    }
    Err(req)
}

async fn dev_proxy(state: &AppState, target: &str, req: axum::extract::Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path();
    let query = parts.uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let url = format!("{}{}{}", target.trim_end_matches('/'), path, query);

    let Ok(target_uri) = target.parse::<axum::http::Uri>() else {
        return crate::response::error_response(&HypervisorError::DevProxy("invalid devProxyTarget".to_string()));
    };
    let Some(target_host) = target_uri.host() else {
        return crate::response::error_response(&HypervisorError::DevProxy("devProxyTarget has no host".to_string()));
    };

    let mut headers = parts.headers.clone();
    if let Ok(value) = HeaderValue::from_str(target_host) {
        headers.insert(axum::http::header::HOST, value);
    }

    let reqwest_method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut reqwest_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            reqwest_headers.insert(name, value);
        }
    }

    let stream = futures_util::StreamExt::map(body.into_data_stream(), |item| {
        item.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
    });
    let result = state
        .http_client
        .request(reqwest_method, &url)
        .headers(reqwest_headers)
        .body(reqwest::Body::wrap_stream(stream))
        .send()
        .await;

    match result {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response_headers = axum::http::HeaderMap::new();
            for (name, value) in upstream.headers().iter() {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::try_from(name.as_str()),
                    axum::http::HeaderValue::from_bytes(value.as_bytes()),
                ) {
                    response_headers.insert(name, value);
                }
            }
            let body = Body::from_stream(upstream.bytes_stream());
            let mut response = (status, body).into_response();
            *response.headers_mut() = response_headers;
            response
        }
        Err(err) => {
            warn!(url = %url, error = %err, "dev proxy upstream error");
            crate::response::error_response(&HypervisorError::DevProxy(err.to_string()))
        }
    }
}

/// Resolve `<static_dir>/<request_path>`, guaranteeing the result stays
/// inside `static_dir` (rejecting `..` components rather than trusting
/// `Path::join`/canonicalize alone, since the target file may not exist
/// yet when serving a fresh static export).
fn safe_join(static_dir: &str, request_path: &str) -> Option<PathBuf> {
    let mut resolved = PathBuf::from(static_dir);
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

async fn serve_static(static_dir: &str, request_path: &str, cache_control: Option<&str>) -> Response {
    let Some(candidate) = safe_join(static_dir, request_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(response) = try_serve_file(&candidate, cache_control).await {
        return response;
    }

    let index = Path::new(static_dir).join("index.html");
    match try_serve_file(&index, cache_control).await {
        Some(response) => response,
        None => crate::response::error_response(&HypervisorError::NotFound),
    }
}

async fn try_serve_file(path: &Path, cache_control: Option<&str>) -> Option<Response> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut response = (StatusCode::OK, bytes).into_response();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
    }
    if let Some(cache_control) = cache_control {
        if let Ok(value) = HeaderValue::from_str(cache_control) {
            response.headers_mut().insert(axum::http::header::CACHE_CONTROL, value);
        }
    }
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_api_path_defaults_to_true_with_no_web_config() {
        assert!(is_api_path(None, "/anything"));
    }

    #[test]
    fn is_api_path_checks_configured_base_path() {
        let web = WebConfig { api_base_path: "/api".to_string(), ..Default::default() };
        assert!(is_api_path(Some(&web), "/api/users"));
        assert!(!is_api_path(Some(&web), "/assets/app.js"));
    }

    #[test]
    fn safe_join_rejects_parent_dir_traversal() {
        assert!(safe_join("/srv/static", "/../../etc/passwd").is_none());
        assert_eq!(safe_join("/srv/static", "/css/app.css").unwrap(), PathBuf::from("/srv/static/css/app.css"));
    }

    #[tokio::test]
    async fn serve_static_falls_back_to_index_html() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("index.html"), b"<html>spa</html>").await.expect("write index");

        let response = serve_static(dir.path().to_str().unwrap(), "/no-such-file.js", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn serve_static_serves_the_exact_file_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("app.css"), b"body{}").await.expect("write css");

        let response = serve_static(dir.path().to_str().unwrap(), "/app.css", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(axum::http::header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().contains("css"));
    }
}
