// SPDX-License-Identifier: MIT

//! The Lifecycle Manager: spawn coordination, blue/green restart, and
//! readiness waiting, layered on top of `WorkerSpawner` and
//! `oxhv-storage::StateManager`.
//!
//! This is where the spec's concurrency guards live: at most one spawn and
//! at most one restart in flight per project, both collapsed through
//! `StateManager`'s guard sets and ready-waiter channels rather than a
//! per-project mutex (matching the corpus's "one lock behind the state,
//! await outside it" discipline).

use crate::error::EngineError;
use crate::spawner::WorkerSpawner;
use oxhv_config::HypervisorConfig;
use oxhv_core::{ProjectName, SelectedProject};
use oxhv_storage::{PoolEntry, StateManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Spawn parameters captured the first time a project is spawned, so a
/// later restart (idle reap, auto-heal, hot reload) can reproduce the same
/// source/env/permissions without re-running selection.
pub type SpawnCommand = SelectedProject;

/// Coordinates spawning, restarting, and readiness waiting for every
/// project, on top of one shared `StateManager`.
pub struct LifecycleManager {
    config: Arc<HypervisorConfig>,
    state: Arc<StateManager>,
    projects_root: PathBuf,
}

impl LifecycleManager {
    pub fn new(config: Arc<HypervisorConfig>, state: Arc<StateManager>, projects_root: PathBuf) -> Self {
        Self { config, state, projects_root }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// If no pool entry exists for `project`, trigger a restart (which, for
    /// an absent project, is just a first spawn).
    pub async fn ensure_worker(&self, selected: &SelectedProject) -> Result<(), EngineError> {
        if self.state.has_pool(&selected.project) {
            return Ok(());
        }
        self.restart(selected).await
    }

    /// Spawn (or await an in-flight spawn of) a worker for `selected`,
    /// collapsing concurrent first-hit callers into one spawn via the
    /// spawning guard and ready-waiter channel (spec §4.2 step 1).
    pub async fn spawn(&self, selected: &SelectedProject) -> Result<(), EngineError> {
        let project = selected.project.clone();

        if !self.state.try_begin_spawn(&project) {
            let waiter = self.state.register_ready_waiter(&project);
            let timeout = Duration::from_millis(self.config.proxy.timeout_ms);
            match tokio::time::timeout(timeout, waiter).await {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) => return Err(EngineError::Spawn(std::io::Error::other("peer spawn failed"))),
                Ok(Err(_)) | Err(_) => {
                    return Err(EngineError::Spawn(std::io::Error::other(
                        "timed out waiting for in-flight spawn",
                    )))
                }
            }
        }

        let result = self.spawn_inner(selected).await;
        self.state.end_spawn(&project);
        match &result {
            Ok(()) => self.state.notify_ready(&project, true),
            Err(_) => self.state.notify_ready(&project, false),
        }
        result
    }

    async fn spawn_inner(&self, selected: &SelectedProject) -> Result<(), EngineError> {
        let project = selected.project.clone();
        let index = self.state.project_index(&project);
        let last_load = self.state.last_load_ms(&project);

        let spawner = WorkerSpawner::new(&self.config, &self.projects_root);
        let outcome = spawner.spawn(selected, index, last_load).await?;

        let port = outcome.handle.port;
        let child = outcome.child;
        let state = Arc::clone(&self.state);
        let observed_project = project.clone();

        if outcome.ready {
            self.state.set_ready(&project);
            let now = now_ms();
            self.state.touch_load(&project, now);
            self.state.touch_active(&project, now);
            info!(project = %project, port, "worker ready");
        } else {
            self.state.clear_ready(&project);
            warn!(project = %project, port, "worker failed readiness probe");
        }

        self.state.set_last_spawn_options(&project, selected.clone());
        let displaced = self.state.install_pool(&project, PoolEntry::new(outcome.handle, child));

        if let Some(mut old) = displaced {
            tokio::spawn(async move {
                let _ = old.child.kill().await;
                let _ = old.child.wait().await;
            });
        }

        // Exit observer (spec §4.2 step 10): wait on the process that is
        // now installed in the pool. If the pool still points at this same
        // process when it exits, clear it and auto-heal unless this was an
        // intentional stop.
        let config = Arc::clone(&self.config);
        let projects_root = self.projects_root.clone();
        tokio::spawn(async move {
            observe_exit(state, config, projects_root, observed_project, port).await;
        });

        if !outcome.ready {
            return Err(EngineError::Spawn(std::io::Error::other("readiness probe timed out")));
        }
        Ok(())
    }

    /// Idempotent restart: spawns a replacement worker from
    /// `last_spawn_options[p] ?? {project}`, blue/green swaps it into the
    /// pool (the swap itself happens inside `spawn_inner` via
    /// `install_pool`, which kills any displaced entry only after the new
    /// one is already installed), guarded so N concurrent callers produce
    /// exactly one replacement.
    pub async fn restart(&self, selected: &SelectedProject) -> Result<(), EngineError> {
        let project = selected.project.clone();
        if !self.state.try_begin_restart(&project) {
            // Another restart is already in flight; wait for its outcome.
            let waiter = self.state.register_ready_waiter(&project);
            let timeout = Duration::from_millis(self.config.proxy.timeout_ms);
            return match tokio::time::timeout(timeout, waiter).await {
                Ok(Ok(true)) => Ok(()),
                _ => Err(EngineError::Spawn(std::io::Error::other(
                    "timed out waiting for in-flight restart",
                ))),
            };
        }

        let options = self
            .state
            .last_spawn_options(&project)
            .unwrap_or_else(|| selected.clone());
        let result = self.spawn(&options).await;
        self.state.end_restart(&project);
        result
    }

    /// Resolve `true` once `project` is ready, or after `timeout_ms`
    /// elapses with no readiness transition.
    pub async fn wait_for_ready(&self, project: &ProjectName, timeout_ms: u64) -> bool {
        if self.state.is_ready(project) {
            return true;
        }
        let waiter = self.state.register_ready_waiter(project);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), waiter).await {
            Ok(Ok(ready)) => ready,
            _ => self.state.is_ready(project),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wait for the worker process installed for `project` to exit. If the
/// pool entry still points at the same port when it does (i.e. nothing else
/// has already replaced it), clear the pool and readiness flag, then
/// auto-heal via `restart` unless an idle reap marked this stop as
/// intentional.
async fn observe_exit(
    state: Arc<StateManager>,
    config: Arc<HypervisorConfig>,
    projects_root: PathBuf,
    project: ProjectName,
    observed_port: u16,
) {
    // The `Child` handle itself lives inside the `PoolEntry` behind the
    // state manager's lock, which this task does not hold across an await.
    // Poll for exit via a loop rather than taking the lock across `.wait()`.
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        match state.try_wait_pool(&project, observed_port) {
            None => return, // replaced by a blue/green swap or reaped already
            Some(true) => break,
            Some(false) => continue,
        }
    }

    if !state.take_intentional_stop(&project) {
        state.take_pool(&project);
        state.clear_ready(&project);
        warn!(project = %project, "worker exited unexpectedly, auto-healing");
        let manager = LifecycleManager::new(config, state, projects_root);
        if let Some(options) = manager.state.last_spawn_options(&project) {
            if let Err(err) = manager.restart(&options).await {
                warn!(project = %project, error = %err, "auto-heal restart failed");
            }
        }
    } else {
        state.take_pool(&project);
        state.clear_ready(&project);
        info!(project = %project, "worker stopped intentionally, no auto-heal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_core::test_support::SelectedProjectBuilder;

    fn config() -> Arc<HypervisorConfig> {
        Arc::new(HypervisorConfig::default())
    }

    #[tokio::test]
    async fn ensure_worker_is_a_no_op_once_a_pool_entry_exists() {
        let state = Arc::new(StateManager::new());
        let manager = LifecycleManager::new(config(), Arc::clone(&state), PathBuf::from("."));
        let selected = SelectedProjectBuilder::new("alpha").build();

        // Fake install without going through the real spawner.
        let child = tokio::process::Command::new("true").spawn().expect("spawn true");
        state.install_pool(
            &selected.project,
            PoolEntry::new(oxhv_core::WorkerHandle::new(12345, None), child),
        );

        assert!(manager.ensure_worker(&selected).await.is_ok());
    }
}
