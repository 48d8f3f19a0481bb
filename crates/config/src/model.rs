// SPDX-License-Identifier: MIT

//! The configuration shape itself.

use oxhv_core::Permissions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_server_port() -> u16 {
    8080
}

fn default_otlp_port() -> u16 {
    4318
}

fn default_otlp_path_prefix() -> String {
    "/v1".to_string()
}

fn default_base_port() -> u16 {
    9000
}

fn default_proxy_timeout_ms() -> u64 {
    30_000
}

fn default_health_timeout_ms() -> u64 {
    300_000
}

fn default_queue_max_items() -> usize {
    64
}

fn default_queue_max_wait_ms() -> u64 {
    30_000
}

fn default_queue_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_watcher_debounce_ms() -> u64 {
    120
}

fn default_worker_bin() -> String {
    "oxian".to_string()
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    pub server: ServerConfig,
    pub otlp: Option<OtlpConfig>,
    pub proxy: ProxyConfig,
    pub queue: QueueConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
    pub observability: Option<ObservabilityConfig>,
    pub projects: HashMap<String, ProjectConfig>,
    pub select: Vec<SelectRule>,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            otlp: None,
            proxy: ProxyConfig::default(),
            queue: QueueConfig::default(),
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
            observability: None,
            projects: HashMap::new(),
            select: Vec::new(),
        }
    }
}

fn default_otel_protocol() -> String {
    "http/protobuf".to_string()
}

fn default_otel_propagators() -> String {
    "tracecontext,baggage".to_string()
}

fn default_otel_metric_export_interval_ms() -> u64 {
    60_000
}

/// Worker-facing OpenTelemetry environment, set only when present: a
/// project whose worker should export traces/metrics/logs gets the
/// `OTEL_*` variables listed in the specification's External Interfaces
/// section; absent `observability` means workers see no `OTEL_*` env at
/// all, exactly as if the hypervisor had no opinion on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: Option<String>,
    pub otlp_endpoint: String,
    #[serde(default = "default_otel_protocol")]
    pub otlp_protocol: String,
    #[serde(default = "default_otel_propagators")]
    pub propagators: String,
    #[serde(default = "default_otel_metric_export_interval_ms")]
    pub metric_export_interval_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            otlp_endpoint: String::new(),
            otlp_protocol: default_otel_protocol(),
            propagators: default_otel_propagators(),
            metric_export_interval_ms: default_otel_metric_export_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtlpConfig {
    #[serde(default = "default_otlp_port")]
    pub port: u16,
    #[serde(default = "default_otlp_path_prefix")]
    pub path_prefix: String,
    /// Upstream collector URL. When absent, the built-in endpoint always
    /// acks with 202 and never forwards.
    pub upstream: Option<String>,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            port: default_otlp_port(),
            path_prefix: default_otlp_path_prefix(),
            upstream: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default)]
    pub pass_request_id: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_proxy_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            pass_request_id: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(default = "default_queue_max_items")]
    pub max_items: usize,
    #[serde(default = "default_queue_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_queue_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_items: default_queue_max_items(),
            max_wait_ms: default_queue_max_wait_ms(),
            max_body_bytes: default_queue_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// The worker runtime executable, invoked for the materialize, prepare,
    /// and run phases of a spawn.
    #[serde(default = "default_worker_bin")]
    pub worker_bin: String,
    #[serde(default)]
    pub hot_reload: bool,
    /// Autoscale default idle TTL, used when neither the spawn options nor
    /// the per-project config set one.
    pub idle_ttl_ms: Option<u64>,
    #[serde(default = "default_watcher_debounce_ms")]
    pub watcher_debounce_ms: u64,
    /// `--source=<url>`: fallback root used when a `SelectedProject` has no
    /// source of its own.
    pub global_source: Option<String>,
    /// `--deno-config=<path>`, forwarded to workers as `--config`.
    pub host_deno_config: Option<String>,
    /// `--deno-import-map=<path>`, forwarded to workers as `--import-map`.
    pub host_import_map: Option<String>,
    /// `--reload[=targets]`: forces cache invalidation on next spawn.
    #[serde(default)]
    pub force_reload: bool,
    pub reload_targets: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
            worker_bin: default_worker_bin(),
            hot_reload: false,
            idle_ttl_ms: None,
            watcher_debounce_ms: default_watcher_debounce_ms(),
            global_source: None,
            host_deno_config: None,
            host_import_map: None,
            force_reload: false,
            reload_targets: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    #[serde(default = "default_logging_level")]
    pub level: String,
    pub log_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            request_id_header: default_request_id_header(),
            level: default_logging_level(),
            log_path: None,
        }
    }
}

/// Per-project configuration, addressed by project name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub source: Option<String>,
    pub config_path: Option<String>,
    pub permissions: Option<Permissions>,
    pub materialize: Option<MaterializeConfig>,
    pub idle_ttl_ms: Option<u64>,
    pub isolated: bool,
    pub env: HashMap<String, String>,
    pub web: Option<WebConfig>,
    pub hot_reload: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterializeConfig {
    Bool(bool),
    Mode { mode: MaterializeModeConfig },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializeModeConfig {
    Auto,
    Always,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub dev_proxy_target: Option<String>,
    pub static_dir: Option<String>,
    pub cache_control: Option<String>,
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
}

fn default_api_base_path() -> String {
    "/api".to_string()
}

/// One entry of the declarative `select` rule list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectRule {
    pub when: Option<When>,
    #[serde(default)]
    pub default: bool,
    pub project: String,
    pub source: Option<String>,
    pub strip_path_prefix: Option<String>,
    /// Accepted for config-file compatibility but not consumed: a single
    /// worker per project means there is nothing to stick a request to.
    /// Kept as a documented no-op rather than rejecting operator config
    /// that declares it, per the specification's Open Questions.
    pub strategy: Option<String>,
    pub sticky_header: Option<String>,
}

/// Predicates for a `select` rule. A rule matches when ALL present
/// predicates match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct When {
    pub path_prefix: Option<String>,
    pub method: Option<String>,
    pub host_equals: Option<String>,
    pub host_prefix: Option<String>,
    pub host_suffix: Option<String>,
    pub header: HashMap<String, String>,
}
