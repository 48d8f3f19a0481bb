// SPDX-License-Identifier: MIT

//! The read-only status snapshot exposed by the admin status endpoint.

use oxhv_core::ProjectName;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub project: ProjectName,
    pub ready: bool,
    pub inflight: i64,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub last_active_ms: Option<u64>,
    pub last_load_ms: Option<u64>,
}
