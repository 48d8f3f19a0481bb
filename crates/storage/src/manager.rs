// SPDX-License-Identifier: MIT

//! `StateManager`: the single lock behind which all per-project bookkeeping
//! lives.
//!
//! Modeled on the corpus's `ListenCtx::state: Arc<Mutex<MaterializedState>>`
//! pattern, but synchronous end to end: every method here takes the lock,
//! mutates a plain struct, and returns — never across an `.await`. Callers
//! that need to await something (spawning a process, probing readiness)
//! take the lock, decide, release it, then act, exactly as the corpus's
//! listener handlers do around `ctx.state.lock()`.

use crate::health::HealthSnapshot;
use crate::pool::PoolEntry;
use oxhv_core::{ProjectName, SelectedProject};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::oneshot;

#[derive(Default)]
struct Inner {
    pools: HashMap<ProjectName, PoolEntry>,
    ready: HashSet<ProjectName>,
    spawning: HashSet<ProjectName>,
    restarting: HashSet<ProjectName>,
    intentional_stop: HashSet<ProjectName>,
    last_active_ms: HashMap<ProjectName, u64>,
    last_load_ms: HashMap<ProjectName, u64>,
    inflight: HashMap<ProjectName, i64>,
    last_spawn_options: HashMap<ProjectName, SelectedProject>,
    ready_waiters: HashMap<ProjectName, Vec<oneshot::Sender<bool>>>,
    project_indices: HashMap<ProjectName, usize>,
    next_index: usize,
}

/// Owns every process-wide map the Lifecycle Manager and Selector consult.
///
/// A single `parking_lot::Mutex` rather than one lock per map: the
/// invariants the spec names ("a project is never concurrently spawning and
/// restarting", "ready waiters are drained exactly once") span several maps
/// at once, and a single lock makes those transitions atomic without a
/// lock-ordering discipline to get wrong.
#[derive(Default)]
pub struct StateManager {
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    // -- pool lifecycle -----------------------------------------------

    /// Install a newly spawned worker, replacing any prior entry (the
    /// blue/green swap point). Returns the entry that was displaced, if
    /// any, so the caller can stop it outside the lock.
    pub fn install_pool(&self, project: &ProjectName, entry: PoolEntry) -> Option<PoolEntry> {
        self.inner.lock().pools.insert(project.clone(), entry)
    }

    /// Remove and return a project's pool entry, e.g. when tearing down an
    /// intentionally stopped or irrecoverably failed worker.
    pub fn take_pool(&self, project: &ProjectName) -> Option<PoolEntry> {
        self.inner.lock().pools.remove(project)
    }

    pub fn has_pool(&self, project: &ProjectName) -> bool {
        self.inner.lock().pools.contains_key(project)
    }

    /// Non-blocking exit check for the pool entry currently installed for
    /// `project`, used by the exit observer. Returns `None` if the pool
    /// entry has already been replaced or removed (port no longer
    /// matches `expected_port`), `Some(true)` if the process has exited,
    /// `Some(false)` if it is still running.
    pub fn try_wait_pool(&self, project: &ProjectName, expected_port: u16) -> Option<bool> {
        let mut inner = self.inner.lock();
        let entry = inner.pools.get_mut(project)?;
        if entry.handle.port != expected_port {
            return None;
        }
        Some(matches!(entry.child.try_wait(), Ok(Some(_))))
    }

    /// Pick a worker to dispatch to, via the project's picker.
    pub fn pick(&self, project: &ProjectName) -> Option<oxhv_core::WorkerHandle> {
        self.inner.lock().pools.get(project).and_then(PoolEntry::pick)
    }

    // -- readiness ------------------------------------------------------

    pub fn is_ready(&self, project: &ProjectName) -> bool {
        self.inner.lock().ready.contains(project)
    }

    pub fn set_ready(&self, project: &ProjectName) {
        self.inner.lock().ready.insert(project.clone());
    }

    pub fn clear_ready(&self, project: &ProjectName) {
        self.inner.lock().ready.remove(project);
    }

    /// Register a waiter for the next readiness outcome of `project`. The
    /// receiver resolves with `true` once [`StateManager::notify_ready`] is
    /// called with success, `false` on failure, or is dropped-silently (the
    /// `Err` from `.await`) if the manager itself is torn down.
    pub fn register_ready_waiter(&self, project: &ProjectName) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .ready_waiters
            .entry(project.clone())
            .or_default()
            .push(tx);
        rx
    }

    /// Drain and notify every waiter registered for `project` with the
    /// given outcome. Called once per spawn attempt, success or failure.
    pub fn notify_ready(&self, project: &ProjectName, success: bool) {
        let waiters = self
            .inner
            .lock()
            .ready_waiters
            .remove(project)
            .unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(success);
        }
    }

    // -- spawn / restart mutual exclusion --------------------------------

    /// Attempt to claim the spawning guard for `project`. Returns `true` if
    /// this call claimed it (caller should proceed to spawn); `false` if
    /// another in-flight call already holds it.
    pub fn try_begin_spawn(&self, project: &ProjectName) -> bool {
        self.inner.lock().spawning.insert(project.clone())
    }

    pub fn end_spawn(&self, project: &ProjectName) {
        self.inner.lock().spawning.remove(project);
    }

    pub fn is_spawning(&self, project: &ProjectName) -> bool {
        self.inner.lock().spawning.contains(project)
    }

    pub fn try_begin_restart(&self, project: &ProjectName) -> bool {
        self.inner.lock().restarting.insert(project.clone())
    }

    pub fn end_restart(&self, project: &ProjectName) {
        self.inner.lock().restarting.remove(project);
    }

    pub fn is_restarting(&self, project: &ProjectName) -> bool {
        self.inner.lock().restarting.contains(project)
    }

    // -- intentional stop --------------------------------------------

    /// Mark a project as intentionally stopped, so its exit observer does
    /// not treat the exit as a crash requiring auto-heal.
    pub fn mark_intentional_stop(&self, project: &ProjectName) {
        self.inner.lock().intentional_stop.insert(project.clone());
    }

    /// Check and clear the intentional-stop flag in one step, so a single
    /// exit observation consumes it exactly once.
    pub fn take_intentional_stop(&self, project: &ProjectName) -> bool {
        self.inner.lock().intentional_stop.remove(project)
    }

    // -- timestamps and inflight ------------------------------------------

    pub fn touch_active(&self, project: &ProjectName, now_ms: u64) {
        self.inner
            .lock()
            .last_active_ms
            .insert(project.clone(), now_ms);
    }

    pub fn touch_load(&self, project: &ProjectName, now_ms: u64) {
        self.inner
            .lock()
            .last_load_ms
            .insert(project.clone(), now_ms);
    }

    pub fn last_active_ms(&self, project: &ProjectName) -> Option<u64> {
        self.inner.lock().last_active_ms.get(project).copied()
    }

    pub fn last_load_ms(&self, project: &ProjectName) -> Option<u64> {
        self.inner.lock().last_load_ms.get(project).copied()
    }

    pub fn incr_inflight(&self, project: &ProjectName) -> i64 {
        let mut inner = self.inner.lock();
        let count = inner.inflight.entry(project.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn decr_inflight(&self, project: &ProjectName) -> i64 {
        let mut inner = self.inner.lock();
        let count = inner.inflight.entry(project.clone()).or_insert(0);
        *count = (*count - 1).max(0);
        *count
    }

    pub fn inflight(&self, project: &ProjectName) -> i64 {
        self.inner.lock().inflight.get(project).copied().unwrap_or(0)
    }

    // -- last spawn options ------------------------------------------

    /// Cache the `SelectedProject` used for a project's first successful
    /// spawn, so a later restart (idle reap, auto-heal, hot reload) can
    /// reuse the same source/env/permissions without re-running selection.
    pub fn set_last_spawn_options(&self, project: &ProjectName, options: SelectedProject) {
        self.inner
            .lock()
            .last_spawn_options
            .insert(project.clone(), options);
    }

    pub fn last_spawn_options(&self, project: &ProjectName) -> Option<SelectedProject> {
        self.inner.lock().last_spawn_options.get(project).cloned()
    }

    // -- port allocation -----------------------------------------------

    /// Stable per-project index, assigned on first request, used to offset
    /// `base_port` for each project's worker port.
    pub fn project_index(&self, project: &ProjectName) -> usize {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.project_indices.get(project) {
            return *index;
        }
        let index = inner.next_index;
        inner.next_index += 1;
        inner.project_indices.insert(project.clone(), index);
        index
    }

    // -- introspection -----------------------------------------------

    /// Snapshot every known project's health for the admin status endpoint.
    /// A project is "known" once it has an inflight counter, a pool entry,
    /// or a readiness flag; reaped-and-forgotten projects fall out.
    pub fn health_snapshot(&self) -> Vec<HealthSnapshot> {
        let inner = self.inner.lock();
        let mut projects: HashSet<&ProjectName> = HashSet::new();
        projects.extend(inner.pools.keys());
        projects.extend(inner.ready.iter());
        projects.extend(inner.inflight.keys());
        projects.extend(inner.last_active_ms.keys());

        let mut snapshots: Vec<HealthSnapshot> = projects
            .into_iter()
            .map(|project| HealthSnapshot {
                project: project.clone(),
                ready: inner.ready.contains(project),
                inflight: inner.inflight.get(project).copied().unwrap_or(0),
                pid: inner.pools.get(project).and_then(PoolEntry::pid),
                port: inner.pools.get(project).map(|entry| entry.handle.port),
                last_active_ms: inner.last_active_ms.get(project).copied(),
                last_load_ms: inner.last_load_ms.get(project).copied(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.project.as_str().cmp(b.project.as_str()));
        snapshots
    }

    /// Projects with a running pool entry that have been idle at least
    /// `idle_ttl_ms`, for the Lifecycle Manager's reaper to consult. Only
    /// projects with zero inflight requests are candidates.
    pub fn idle_candidates(&self, now_ms: u64, idle_ttl_ms: u64) -> Vec<ProjectName> {
        let inner = self.inner.lock();
        inner
            .pools
            .keys()
            .filter(|project| inner.inflight.get(*project).copied().unwrap_or(0) == 0)
            .filter(|project| {
                let last_active = inner.last_active_ms.get(*project).copied().unwrap_or(0);
                now_ms.saturating_sub(last_active) >= idle_ttl_ms
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_core::WorkerHandle;
    use std::process::Stdio;

    fn project(name: &str) -> ProjectName {
        ProjectName::new(name)
    }

    async fn fake_child() -> tokio::process::Child {
        tokio::process::Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn `true`")
    }

    #[tokio::test]
    async fn install_pool_replaces_prior_entry_and_returns_it() {
        let manager = StateManager::new();
        let proj = project("alpha");
        let first = PoolEntry::new(WorkerHandle::new(9001, None), fake_child().await);
        assert!(manager.install_pool(&proj, first).is_none());

        let second = PoolEntry::new(WorkerHandle::new(9002, None), fake_child().await);
        let displaced = manager.install_pool(&proj, second);
        assert_eq!(displaced.unwrap().handle.port, 9001);
        assert_eq!(manager.pick(&proj).unwrap().port, 9002);
    }

    #[test]
    fn spawn_guard_is_exclusive_until_ended() {
        let manager = StateManager::new();
        let proj = project("alpha");
        assert!(manager.try_begin_spawn(&proj));
        assert!(!manager.try_begin_spawn(&proj));
        manager.end_spawn(&proj);
        assert!(manager.try_begin_spawn(&proj));
    }

    #[tokio::test]
    async fn ready_waiters_are_drained_exactly_once() {
        let manager = StateManager::new();
        let proj = project("alpha");
        let rx1 = manager.register_ready_waiter(&proj);
        let rx2 = manager.register_ready_waiter(&proj);
        manager.notify_ready(&proj, true);
        assert_eq!(rx1.await, Ok(true));
        assert_eq!(rx2.await, Ok(true));

        // A second notify with nothing registered drains nothing and
        // doesn't panic.
        manager.notify_ready(&proj, false);
    }

    #[test]
    fn inflight_never_goes_negative() {
        let manager = StateManager::new();
        let proj = project("alpha");
        assert_eq!(manager.decr_inflight(&proj), 0);
        assert_eq!(manager.incr_inflight(&proj), 1);
        assert_eq!(manager.decr_inflight(&proj), 0);
    }

    #[test]
    fn intentional_stop_flag_is_consumed_on_take() {
        let manager = StateManager::new();
        let proj = project("alpha");
        assert!(!manager.take_intentional_stop(&proj));
        manager.mark_intentional_stop(&proj);
        assert!(manager.take_intentional_stop(&proj));
        assert!(!manager.take_intentional_stop(&proj));
    }

    #[test]
    fn project_index_is_stable_and_increases() {
        let manager = StateManager::new();
        let alpha = project("alpha");
        let beta = project("beta");
        assert_eq!(manager.project_index(&alpha), 0);
        assert_eq!(manager.project_index(&beta), 1);
        assert_eq!(manager.project_index(&alpha), 0);
    }

    #[tokio::test]
    async fn idle_candidates_respects_inflight_and_ttl() {
        let manager = StateManager::new();
        let proj = project("alpha");
        manager.install_pool(
            &proj,
            PoolEntry::new(WorkerHandle::new(9001, None), fake_child().await),
        );
        manager.touch_active(&proj, 1_000);

        assert!(manager.idle_candidates(1_500, 1_000).is_empty());
        assert_eq!(manager.idle_candidates(2_000, 1_000), vec![proj.clone()]);

        manager.incr_inflight(&proj);
        assert!(manager.idle_candidates(5_000, 1_000).is_empty());
    }

    #[test]
    fn health_snapshot_is_sorted_and_covers_known_projects() {
        let manager = StateManager::new();
        manager.touch_active(&project("zeta"), 10);
        manager.set_ready(&project("alpha"));
        let snapshot = manager.health_snapshot();
        let names: Vec<&str> = snapshot.iter().map(|s| s.project.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
