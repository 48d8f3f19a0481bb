// SPDX-License-Identifier: MIT

//! The `SelectedProject` produced by the Selector for a single request.

use crate::id::ProjectName;
use crate::permissions::Permissions;
use std::collections::HashMap;

/// Materialize mode for the two-phase pre-spawn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterializeMode {
    /// Materialize is skipped entirely.
    #[default]
    Off,
    /// Materialize always runs.
    Always,
    /// Materialize runs only when the source is remote (auto-detected).
    Auto,
}

/// Transient, per-request selection result.
///
/// Produced by a `ProjectSelector` (either a user-supplied provider or the
/// declarative rule walker) and, for the first spawn of a project, captured
/// as `last_spawn_options` to drive consistent restarts.
#[derive(Debug, Clone, Default)]
pub struct SelectedProject {
    pub project: ProjectName,
    pub source: Option<String>,
    pub config_path: Option<String>,
    pub github_token: Option<String>,
    pub env: HashMap<String, String>,
    pub permissions: Option<Permissions>,
    pub materialize: MaterializeMode,
    pub invalidate_cache_at: Option<u64>,
    pub idle_ttl_ms: Option<u64>,
    pub isolated: bool,
    pub strip_path_prefix: Option<String>,
}

impl SelectedProject {
    pub fn for_project(project: ProjectName) -> Self {
        Self {
            project,
            ..Default::default()
        }
    }

    pub fn default_project() -> Self {
        Self::for_project(ProjectName::default_project())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_project_preserves_name_with_defaults_elsewhere() {
        let sel = SelectedProject::for_project(ProjectName::new("alpha"));
        assert_eq!(sel.project.as_str(), "alpha");
        assert!(sel.source.is_none());
        assert_eq!(sel.materialize, MaterializeMode::Off);
    }

    #[test]
    fn default_project_is_named_default() {
        let sel = SelectedProject::default_project();
        assert!(sel.project.is_default());
    }
}
