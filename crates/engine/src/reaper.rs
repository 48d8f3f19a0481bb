// SPDX-License-Identifier: MIT

//! The Idle Reaper: a 1Hz background task that stops workers with zero
//! inflight requests that have been idle past their configured TTL.

use oxhv_config::HypervisorConfig;
use oxhv_core::{Clock, ProjectName};
use oxhv_storage::StateManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Resolve the effective idle TTL for `project`: last-spawn options, then
/// per-project config, then the global autoscale default. `None` means the
/// project is never idle-reaped.
fn idle_ttl_ms(config: &HypervisorConfig, state: &StateManager, project: &ProjectName) -> Option<u64> {
    if let Some(options) = state.last_spawn_options(project) {
        if let Some(ttl) = options.idle_ttl_ms {
            return Some(ttl);
        }
    }
    if let Some(project_config) = config.projects.get(project.as_str()) {
        if let Some(ttl) = project_config.idle_ttl_ms {
            return Some(ttl);
        }
    }
    config.runtime.idle_ttl_ms
}

/// Owns the background idle-reap loop. `run` never returns; callers spawn
/// it as a detached task at startup.
pub struct IdleReaper<C: Clock> {
    config: Arc<HypervisorConfig>,
    state: Arc<StateManager>,
    clock: C,
    tick: Duration,
}

impl<C: Clock> IdleReaper<C> {
    pub fn new(config: Arc<HypervisorConfig>, state: Arc<StateManager>, clock: C) -> Self {
        Self { config, state, clock, tick: Duration::from_secs(1) }
    }

    /// Run one reap pass: mark intentional stop, remove the pool entry,
    /// and kill the process for every idle candidate. Returns the list of
    /// reaped projects (for tests and logging).
    pub async fn reap_once(&self) -> Vec<ProjectName> {
        let now = self.clock.epoch_ms();
        let mut reaped = Vec::new();

        // Collect candidates per-project TTL: `StateManager::idle_candidates`
        // takes one TTL, so projects with heterogeneous TTLs are checked
        // individually rather than in one global sweep.
        let mut projects: Vec<ProjectName> = self.state.idle_candidates(now, 0);
        projects.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        projects.dedup();

        for project in projects {
            let Some(ttl) = idle_ttl_ms(&self.config, &self.state, &project) else {
                continue;
            };
            let last_active = self.state.last_active_ms(&project).unwrap_or(0);
            if now.saturating_sub(last_active) < ttl {
                continue;
            }
            if self.state.inflight(&project) != 0 {
                continue;
            }

            self.state.mark_intentional_stop(&project);
            self.state.clear_ready(&project);
            if let Some(mut entry) = self.state.take_pool(&project) {
                let _ = entry.child.kill().await;
                let _ = entry.child.wait().await;
            }
            // The reaper removes the pool entry itself, so the exit
            // observer's `try_wait_pool` will see it gone and return early
            // without ever reaching its own `take_intentional_stop` call
            // (lifecycle.rs's `observe_exit`). Consume the flag here instead,
            // so it cannot leak forward and suppress auto-heal for whatever
            // worker replaces this project next.
            self.state.take_intentional_stop(&project);
            info!(project = %project, "idle reap");
            reaped.push(project);
        }

        reaped
    }

    /// Run the reap loop forever at `self.tick` cadence.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            interval.tick().await;
            self.reap_once().await;
        }
    }
}

/// Convenience constructor used by `oxhv-daemon` at startup, binding the
/// reaper to a fresh `LifecycleManager`'s state (kept separate from
/// `LifecycleManager` itself since the reaper never spawns — only stops).
pub fn spawn_background<C: Clock>(
    config: Arc<HypervisorConfig>,
    state: Arc<StateManager>,
    clock: C,
) -> tokio::task::JoinHandle<()> {
    let reaper = IdleReaper::new(config, state, clock);
    tokio::spawn(reaper.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_core::test_support::SelectedProjectBuilder;
    use oxhv_core::{FakeClock, WorkerHandle};
    use oxhv_storage::PoolEntry;
    use std::process::Stdio;

    async fn fake_child() -> tokio::process::Child {
        tokio::process::Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sleep")
    }

    #[tokio::test]
    async fn reaps_a_project_idle_past_its_ttl_with_zero_inflight() {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        let clock = FakeClock::new();
        let project = oxhv_core::ProjectName::new("alpha");

        state.install_pool(&project, PoolEntry::new(WorkerHandle::new(9001, None), fake_child().await));
        state.set_ready(&project);
        state.touch_active(&project, clock.epoch_ms());
        state.set_last_spawn_options(
            &project,
            SelectedProjectBuilder::new("alpha").idle_ttl_ms(100).build(),
        );

        let reaper = IdleReaper::new(Arc::clone(&config), Arc::clone(&state), clock.clone());
        assert!(reaper.reap_once().await.is_empty());

        clock.advance(Duration::from_millis(150));
        let reaped = reaper.reap_once().await;
        assert_eq!(reaped, vec![project.clone()]);
        assert!(!state.has_pool(&project));
        assert!(!state.is_ready(&project));
        // The reaper consumes its own intentional-stop flag once it has
        // finished tearing the worker down itself, since no exit observer
        // remains to consume it (the pool entry is already gone).
        assert!(!state.take_intentional_stop(&project));
    }

    #[tokio::test]
    async fn never_reaps_a_project_with_inflight_requests() {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        let clock = FakeClock::new();
        let project = oxhv_core::ProjectName::new("alpha");

        state.install_pool(&project, PoolEntry::new(WorkerHandle::new(9001, None), fake_child().await));
        state.touch_active(&project, clock.epoch_ms());
        state.set_last_spawn_options(
            &project,
            SelectedProjectBuilder::new("alpha").idle_ttl_ms(100).build(),
        );
        state.incr_inflight(&project);

        clock.advance(Duration::from_millis(500));
        let reaper = IdleReaper::new(config, Arc::clone(&state), clock);
        assert!(reaper.reap_once().await.is_empty());
        assert!(state.has_pool(&project));
    }

    #[tokio::test]
    async fn a_project_with_no_configured_ttl_is_never_reaped() {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        let clock = FakeClock::new();
        let project = oxhv_core::ProjectName::new("alpha");

        state.install_pool(&project, PoolEntry::new(WorkerHandle::new(9001, None), fake_child().await));
        state.touch_active(&project, clock.epoch_ms());

        clock.advance(Duration::from_secs(3600));
        let reaper = IdleReaper::new(config, Arc::clone(&state), clock);
        assert!(reaper.reap_once().await.is_empty());
        assert!(state.has_pool(&project));
    }
}
