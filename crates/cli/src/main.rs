// SPDX-License-Identifier: MIT

//! `oxhv`: the hypervisor binary — parses CLI flags, loads configuration,
//! initializes logging, and runs the daemon until a shutdown signal.
//!
//! Exit codes (specification §6): `0` on graceful shutdown, non-zero on an
//! unrecoverable startup failure (config parse error, listener bind
//! failure).

use clap::Parser;
use oxhv_config::cli_overrides::CliOverrides;
use oxhv_daemon::{AppCapabilities, ServerHandles};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Oxian Hypervisor: a multi-tenant process supervisor and reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "oxhv", version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")))]
struct Cli {
    /// Path to the TOML configuration file. Absent: defaults plus whatever
    /// other flags are given.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the public listener port (`server.port`).
    #[arg(long = "port", value_name = "N")]
    port: Option<u16>,

    /// Fallback source root used when a selected project has none of its
    /// own (`runtime.global_source`).
    #[arg(long = "source", value_name = "URL")]
    source: Option<String>,

    /// Host-level Deno config forwarded to every worker as `--config`.
    #[arg(long = "deno-config", value_name = "PATH")]
    deno_config: Option<String>,

    /// Host-level import map forwarded to every worker as `--import-map`.
    #[arg(long = "deno-import-map", value_name = "PATH")]
    deno_import_map: Option<String>,

    /// Force module cache invalidation on next spawn. An optional
    /// comma-separated target list may follow `=`.
    #[arg(long = "reload", value_name = "TARGETS", num_args = 0..=1, default_missing_value = "")]
    reload: Option<String>,

    /// Root directory the hypervisor operates from: isolated projects'
    /// working directories and the hot-reload watcher (when enabled) are
    /// rooted here. Defaults to the current working directory.
    #[arg(long = "root", value_name = "PATH")]
    root: Option<PathBuf>,
}

impl Cli {
    fn into_overrides(self) -> (Option<PathBuf>, PathBuf, CliOverrides) {
        let reload = self.reload.map(|targets| if targets.is_empty() { None } else { Some(targets) });
        let overrides = CliOverrides {
            port: self.port,
            source: self.source,
            deno_config: self.deno_config,
            deno_import_map: self.deno_import_map,
            reload,
        };
        let root = self.root.unwrap_or_else(|| PathBuf::from("."));
        (self.config, root, overrides)
    }
}

fn init_logging(level: &str, log_path: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_path {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "oxhv.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config_path, root, overrides) = cli.into_overrides();

    let config = match oxhv_config::load(config_path.as_deref(), overrides) {
        Ok(config) => config,
        Err(err) => {
            // Logging isn't initialized yet: a config parse failure is
            // reported directly, matching the "never a panic unwind"
            // contract without pretending we have a configured logger.
            eprintln!("oxhv: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config.logging.level, config.logging.log_path.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        port = config.server.port,
        "starting oxhv"
    );

    let config = std::sync::Arc::new(config);
    let handles = match oxhv_daemon::run(config, root, AppCapabilities::default()).await {
        Ok(handles) => handles,
        Err(err) => {
            error!(error = %err, "failed to start hypervisor");
            return ExitCode::FAILURE;
        }
    };

    let ServerHandles { public, otlp, reaper, watcher } = handles;

    tokio::select! {
        result = public => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "public listener exited with an error");
                    return ExitCode::FAILURE;
                }
                Err(err) => {
                    error!(error = %err, "public listener task panicked");
                    return ExitCode::FAILURE;
                }
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    reaper.abort();
    if let Some(otlp) = otlp {
        otlp.abort();
    }
    if let Some((_watcher, task)) = watcher {
        task.abort();
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            unreachable!();
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
