// SPDX-License-Identifier: MIT

//! `ExportSink`: the OTLP passthrough endpoint's optional hooks.
//!
//! Covers both callback fields the distilled contract names for the OTLP
//! component: the `onRequest({kind, req, project, contentType, headers})`
//! hook that decides whether a telemetry POST should be forwarded, and the
//! `onExport` callback invoked with the buffered body for the "collector"
//! variant that doesn't forward at all.

use async_trait::async_trait;
use oxhv_core::ProjectName;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpSignalKind {
    Traces,
    Metrics,
    Logs,
}

#[derive(Debug, Clone)]
pub struct OtlpContext {
    pub kind: OtlpSignalKind,
    pub project: ProjectName,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
}

#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Decide whether an OTLP POST should be forwarded upstream. Defaults
    /// to forwarding everything.
    async fn should_forward(&self, _ctx: &OtlpContext) -> bool {
        true
    }

    /// Observe the buffered request body, e.g. to archive it locally
    /// instead of (or in addition to) forwarding.
    async fn on_export(&self, _ctx: &OtlpContext, _body: &[u8]) {}
}
