// SPDX-License-Identifier: MIT

//! `RequestTransformer`: the optional `onRequest` hook run before a request
//! is dispatched to a worker.

use async_trait::async_trait;
use oxhv_core::ProjectName;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub project: ProjectName,
}

#[derive(Debug, Error)]
#[error("request transformation failed: {0}")]
pub struct TransformError(pub String);

#[async_trait]
pub trait RequestTransformer: Send + Sync {
    /// Inspect (and optionally reject) a request before it is proxied.
    /// An `Err` here surfaces as a 500 `{error:{message:"Request
    /// transformation failed"}}` at the public listener boundary.
    async fn transform(&self, request: &TransformRequest) -> Result<(), TransformError>;
}
