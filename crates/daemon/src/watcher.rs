// SPDX-License-Identifier: MIT

//! Hot-reload file watcher (specification §9 Design Notes): a debounced
//! (120 ms default) filesystem event stream that triggers `restart` for
//! every currently-known project. The watcher owns no routing state — it
//! only notices change and asks the Lifecycle Manager to restart.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use oxhv_core::SelectedProject;
use oxhv_engine::LifecycleManager;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// Start watching `root` recursively, forwarding each filesystem event onto
/// an unbounded channel. Returns the watcher (which must be kept alive for
/// as long as watching should continue) and the receiving end.
pub fn watch(root: impl AsRef<Path>) -> notify::Result<(RecommendedWatcher, UnboundedReceiver<()>)> {
    let (tx, rx) = unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if event.is_ok() {
            let _ = tx.send(());
        }
    })?;
    watcher.watch(root.as_ref(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Drain `rx`, collapsing bursts of events within `debounce` of each other
/// into a single restart pass over every project the [`LifecycleManager`]
/// currently knows about.
pub async fn run(mut rx: UnboundedReceiver<()>, debounce: Duration, lifecycle: Arc<LifecycleManager>) {
    while rx.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(())) => continue,
                _ => break,
            }
        }

        let snapshot = lifecycle.state().health_snapshot();
        info!(projects = snapshot.len(), "hot reload triggered");
        for entry in snapshot {
            let selected = SelectedProject::for_project(entry.project.clone());
            if let Err(err) = lifecycle.restart(&selected).await {
                warn!(project = %entry.project, error = %err, "hot reload restart failed");
            }
        }
    }
}

/// Convenience helper used by `server::run` to wire up watching only when
/// `runtime.hotReload` is enabled.
pub fn spawn_hot_reload(root: impl AsRef<Path>, debounce_ms: u64, lifecycle: Arc<LifecycleManager>) -> Option<(RecommendedWatcher, tokio::task::JoinHandle<()>)> {
    let (watcher, rx) = match watch(root) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, "failed to start hot reload watcher");
            return None;
        }
    };
    let handle = tokio::spawn(run(rx, Duration::from_millis(debounce_ms), lifecycle));
    Some((watcher, handle))
}

/// Expose the channel sender type for tests that want to drive [`run`]
/// directly without a real filesystem watcher.
pub type EventSender = UnboundedSender<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use oxhv_config::HypervisorConfig;
    use oxhv_storage::StateManager;
    use std::path::PathBuf;

    #[tokio::test]
    async fn bursts_of_events_within_the_debounce_window_trigger_one_restart_pass() {
        let config = Arc::new(HypervisorConfig::default());
        let state = Arc::new(StateManager::new());
        state.touch_active(&oxhv_core::ProjectName::new("alpha"), 0);
        let lifecycle = Arc::new(LifecycleManager::new(config, Arc::clone(&state), PathBuf::from(".")));

        let (tx, rx): (EventSender, _) = unbounded_channel();
        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        drop(tx);

        // `run` exits once the channel is closed and drained; bound the
        // test's wait to the debounce window plus slack.
        tokio::time::timeout(Duration::from_millis(200), run(rx, Duration::from_millis(20), lifecycle)).await.unwrap();
    }
}
