// SPDX-License-Identifier: MIT

//! Builders used by other crates' test suites. Gated behind `test-support`
//! so production builds never pull this in.

use crate::id::ProjectName;
use crate::selection::SelectedProject;

/// Convenience builder for a `SelectedProject` in tests, avoiding a long
/// struct-update-syntax literal in every test case.
pub struct SelectedProjectBuilder {
    inner: SelectedProject,
}

impl SelectedProjectBuilder {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            inner: SelectedProject::for_project(ProjectName::new(project.into())),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.inner.source = Some(source.into());
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.inner.isolated = isolated;
        self
    }

    pub fn idle_ttl_ms(mut self, ms: u64) -> Self {
        self.inner.idle_ttl_ms = Some(ms);
        self
    }

    pub fn build(self) -> SelectedProject {
        self.inner
    }
}
