// SPDX-License-Identifier: MIT

//! `ProjectSelector`: the user-supplied provider hook for request-based
//! project selection.
//!
//! Declarative `select` rules (`oxhv-config::select`) cover the common
//! case; this trait is the escape hatch for selection logic that can't be
//! expressed declaratively. When present, its return replaces whatever the
//! rule walker produced.

use async_trait::async_trait;
use oxhv_core::SelectedProject;
use std::collections::HashMap;
use thiserror::Error;

/// The subset of an incoming request a selector needs: enough to route on,
/// nothing that couples this crate to a particular HTTP framework.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("project selection failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ProjectSelector: Send + Sync {
    /// Produce a selection override for `request`, or `Ok(None)` to defer
    /// to the declarative rules.
    async fn select(&self, request: &SelectionRequest) -> Result<Option<SelectedProject>, SelectionError>;
}
