// SPDX-License-Identifier: MIT

//! The Worker Spawner: turns a `SelectedProject` into a running,
//! health-checked worker process bound to a free local port.

use crate::error::EngineError;
use crate::importmap::ImportMap;
use crate::permissions;
use crate::port;
use crate::process::{run_with_timeout, MATERIALIZE_TIMEOUT, PREPARE_TIMEOUT};
use oxhv_adapters::resolver::{is_remote_source, working_dir_for};
use oxhv_adapters::{GitHubResolver, HttpResolver, LocalResolver, Resolver};
use oxhv_config::{HypervisorConfig, MaterializeConfig, MaterializeModeConfig, ProjectConfig};
use oxhv_core::selection::MaterializeMode;
use oxhv_core::{SelectedProject, WorkerHandle};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Everything the spawner needs beyond the `SelectedProject` itself: the
/// static configuration and where on disk the hypervisor is rooted.
pub struct WorkerSpawner<'a> {
    pub config: &'a HypervisorConfig,
    pub projects_root: &'a Path,
}

/// The outcome of a successful spawn: the handle to publish, and the raw
/// child so the caller (Lifecycle Manager) can install it into the pool and
/// attach an exit observer.
pub struct SpawnOutcome {
    pub handle: WorkerHandle,
    pub child: Child,
    pub ready: bool,
}

impl<'a> WorkerSpawner<'a> {
    pub fn new(config: &'a HypervisorConfig, projects_root: &'a Path) -> Self {
        Self { config, projects_root }
    }

    /// Spawn a worker for `selected`. The caller is assumed to already hold
    /// the per-project spawning guard (`StateManager::try_begin_spawn`) —
    /// the concurrency-gate step of the spec's algorithm is the Lifecycle
    /// Manager's job, not this one's, since it owns the ready-waiter queue
    /// this gate collapses into.
    pub async fn spawn(
        &self,
        selected: &SelectedProject,
        index: usize,
        project_last_load_ms: Option<u64>,
    ) -> Result<SpawnOutcome, EngineError> {
        let project_config = self.config.projects.get(selected.project.as_str()).cloned();

        // Step 2: port allocation.
        let port = port::allocate(self.config.runtime.base_port, index);

        // Step 3: resolver construction.
        let source = selected
            .source
            .clone()
            .or_else(|| project_config.as_ref().and_then(|p| p.source.clone()))
            .or_else(|| self.config.runtime.global_source.clone());
        let resolver = build_resolver(source.as_deref(), selected.github_token.as_deref());

        // Working directory: isolated projects get a content-addressed
        // subdirectory; everything else runs at the hypervisor root.
        let project_dir = if selected.isolated
            || project_config.as_ref().map(|p| p.isolated).unwrap_or(false)
        {
            let dir = working_dir_for(self.projects_root, selected.project.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(EngineError::Spawn)?;
            dir
        } else {
            self.projects_root.to_path_buf()
        };

        // Step 4: host config + import map merge.
        let built_in = resolver
            .load("deno.json")
            .await
            .map(|bytes| ImportMap::from_json(&bytes))
            .unwrap_or_default();
        let host_map = match &self.config.runtime.host_import_map {
            Some(path) => tokio::fs::read(path)
                .await
                .ok()
                .map(|bytes| ImportMap::from_json(&bytes)),
            None => None,
        };
        let merged_map = built_in.merged_with(host_map).rewrite_bare_specifiers(resolver.as_ref()).await;
        let import_map_url = merged_map.to_data_url();

        // Step 5: permission flags, project config overridden by selection.
        let effective_permissions = selected
            .permissions
            .clone()
            .or_else(|| project_config.as_ref().and_then(|p| p.permissions.clone()));
        let permission_flags = permissions::to_flags(effective_permissions.as_ref());

        // Step 6: cache invalidation.
        let force_reload = self.config.runtime.force_reload || self.config.runtime.hot_reload;
        let invalidate = force_reload
            || selected
                .invalidate_cache_at
                .zip(project_last_load_ms)
                .map(|(invalidate_at, last_load)| invalidate_at > last_load)
                .unwrap_or(false);

        // Step 7: two-phase pre-run.
        let materialize_mode = effective_materialize_mode(selected, project_config.as_ref());
        let is_remote = source.as_deref().map(is_remote_source).unwrap_or(false);
        let should_materialize = match materialize_mode {
            MaterializeMode::Off => false,
            MaterializeMode::Always => true,
            MaterializeMode::Auto => is_remote,
        };

        let mut env = project_config
            .as_ref()
            .map(|p| p.env.clone())
            .unwrap_or_default();
        for (key, value) in &selected.env {
            env.insert(key.clone(), value.clone());
        }
        if let Some(token) = &selected.github_token {
            env.insert("GITHUB_TOKEN".to_string(), token.clone());
            env.insert(
                "DENO_AUTH_TOKENS".to_string(),
                format!("{token}@raw.githubusercontent.com"),
            );
        }
        if selected.isolated {
            env.insert("DENO_DIR".to_string(), "./.deno/DENO_DIR".to_string());
        }
        if let Some(observability) = &self.config.observability {
            env.insert(
                "OTEL_SERVICE_NAME".to_string(),
                observability.service_name.clone().unwrap_or_else(|| selected.project.as_str().to_string()),
            );
            env.insert("OTEL_EXPORTER_OTLP_ENDPOINT".to_string(), observability.otlp_endpoint.clone());
            env.insert("OTEL_EXPORTER_OTLP_PROTOCOL".to_string(), observability.otlp_protocol.clone());
            env.insert(
                "OTEL_EXPORTER_OTLP_HEADERS".to_string(),
                format!("x-oxian-project={}", selected.project.as_str()),
            );
            env.insert(
                "OTEL_RESOURCE_ATTRIBUTES".to_string(),
                format!("oxian.project={}", selected.project.as_str()),
            );
            env.insert("OTEL_PROPAGATORS".to_string(), observability.propagators.clone());
            env.insert(
                "OTEL_METRIC_EXPORT_INTERVAL".to_string(),
                observability.metric_export_interval_ms.to_string(),
            );
        }

        if should_materialize {
            resolver
                .materialize(&project_dir, force_reload)
                .await
                .map_err(|e| EngineError::Materialize(e.to_string()))?;
            let mut materialize_args = vec![
                "materialize".to_string(),
                format!("--source={}", source.clone().unwrap_or_default()),
                "--materialize-dir=.".to_string(),
            ];
            if force_reload {
                materialize_args.push("--materialize-refresh".to_string());
            }
            let materialize_args: Vec<&str> = materialize_args.iter().map(String::as_str).collect();
            run_phase(
                &self.config.runtime.worker_bin,
                &materialize_args,
                &project_dir,
                &env,
                MATERIALIZE_TIMEOUT,
            )
            .await
            .map_err(EngineError::Materialize)?;
            run_phase(
                &self.config.runtime.worker_bin,
                &["prepare"],
                &project_dir,
                &env,
                PREPARE_TIMEOUT,
            )
            .await
            .map_err(EngineError::Prepare)?;
        }

        // Step 8: run phase.
        let mut command = Command::new(&self.config.runtime.worker_bin);
        command
            .arg("run")
            .arg(format!("--port={port}"))
            .arg(format!("--import-map={import_map_url}"))
            .args(&permission_flags)
            .current_dir(&project_dir)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if invalidate {
            let config_url = project_config
                .as_ref()
                .and_then(|p| p.config_path.clone())
                .unwrap_or_default();
            command.arg(format!("--reload={},{}", source.clone().unwrap_or_default(), config_url));
        }

        let child = command.spawn().map_err(EngineError::Spawn)?;
        let pid = child.id();
        let handle = WorkerHandle::new(port, pid);

        // Step 9: readiness probe.
        let ready = probe_readiness(port, Duration::from_millis(self.config.proxy.health_timeout_ms)).await;

        Ok(SpawnOutcome { handle, child, ready })
    }
}

fn effective_materialize_mode(
    selected: &SelectedProject,
    project_config: Option<&ProjectConfig>,
) -> MaterializeMode {
    if selected.materialize != MaterializeMode::Off {
        return selected.materialize;
    }
    match project_config.and_then(|p| p.materialize.as_ref()) {
        Some(MaterializeConfig::Bool(true)) => MaterializeMode::Always,
        Some(MaterializeConfig::Bool(false)) | None => MaterializeMode::Off,
        Some(MaterializeConfig::Mode { mode: MaterializeModeConfig::Always }) => MaterializeMode::Always,
        Some(MaterializeConfig::Mode { mode: MaterializeModeConfig::Auto }) => MaterializeMode::Auto,
    }
}

fn build_resolver(source: Option<&str>, token: Option<&str>) -> Box<dyn Resolver> {
    match source {
        Some(src) if src.starts_with("github:") => {
            let rest = src.trim_start_matches("github:");
            let (owner_repo, reference) = match rest.split_once('@') {
                Some((left, right)) => (left, right.to_string()),
                None => (rest, "main".to_string()),
            };
            let (owner, repo) = owner_repo.split_once('/').unwrap_or((owner_repo, ""));
            Box::new(GitHubResolver::new(owner, repo, reference, token.map(str::to_string)))
        }
        Some(src) if src.starts_with("http://") || src.starts_with("https://") => {
            Box::new(HttpResolver::new(src))
        }
        Some(src) => Box::new(LocalResolver::new(src)),
        None => Box::new(LocalResolver::new(".")),
    }
}

async fn run_phase(
    worker_bin: &str,
    args: &[&str],
    cwd: &Path,
    env: &std::collections::HashMap<String, String>,
    timeout: Duration,
) -> Result<(), String> {
    let mut cmd = Command::new(worker_bin);
    cmd.args(args).current_dir(cwd).envs(env).kill_on_drop(true);
    let output = run_with_timeout(cmd, timeout, worker_bin).await?;
    if !output.status.success() {
        return Err(format!(
            "{worker_bin} {args:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

/// Per-attempt timeout for a single `HEAD /_health` probe (specification §5:
/// "Readiness probes carry a per-attempt 500ms timeout; total bounded by
/// proxy.timeoutMs"), so a hung worker can't stall the 100ms poll loop past
/// the overall `timeout` deadline.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll `HEAD /_health` every 100ms until a response with status >= 200 is
/// observed, or `timeout` elapses.
async fn probe_readiness(port: u16, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(HEALTH_PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => reqwest::Client::new(),
    };
    let url = format!("http://127.0.0.1:{port}/_health");
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(response) = client.head(&url).send().await {
            if response.status().as_u16() >= 200 {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
