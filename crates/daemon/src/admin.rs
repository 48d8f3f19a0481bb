// SPDX-License-Identifier: MIT

//! `GET /_oxhv/status`: a read-only introspection endpoint over
//! [`oxhv_storage::StateManager::health_snapshot`] (specification §7
//! supplementary interface — not part of the distilled core, added because
//! an operator needs some way to see pool state without attaching a
//! debugger).

use crate::state::AppState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.state.health_snapshot();
    Json(json!({ "projects": snapshot }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppCapabilities;
    use oxhv_config::HypervisorConfig;
    use oxhv_engine::LifecycleManager;
    use oxhv_storage::StateManager;
    use std::path::PathBuf;

    #[tokio::test]
    async fn status_reflects_touched_projects() {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        state.touch_active(&oxhv_core::ProjectName::new("alpha"), 10);
        let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&config), Arc::clone(&state), PathBuf::from(".")));
        let app_state = Arc::new(AppState::new(config, state, lifecycle, AppCapabilities::default()));

        let Json(body) = status(State(app_state)).await;
        let projects = body["projects"].as_array().expect("array");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0]["project"], "alpha");
    }
}
