// SPDX-License-Identifier: MIT

//! CLI flag overrides layered on top of the parsed config file.
//!
//! Kept as a plain struct (rather than parsing with `clap` in this crate)
//! so `oxhv-config` stays free of a CLI-parsing dependency; `oxhv-cli`
//! builds one of these from its `clap::Parser` output and hands it to
//! `load`.

use crate::model::HypervisorConfig;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub source: Option<String>,
    pub deno_config: Option<String>,
    pub deno_import_map: Option<String>,
    /// `Some(None)` = `--reload` with no targets; `Some(Some(targets))` =
    /// `--reload=targets`; `None` = flag absent.
    pub reload: Option<Option<String>>,
}

impl CliOverrides {
    pub fn apply(self, config: &mut HypervisorConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(source) = self.source {
            config.runtime.global_source = Some(source);
        }
        if let Some(path) = self.deno_config {
            config.runtime.host_deno_config = Some(path);
        }
        if let Some(path) = self.deno_import_map {
            config.runtime.host_import_map = Some(path);
        }
        if let Some(targets) = self.reload {
            config.runtime.force_reload = true;
            config.runtime.reload_targets = targets;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_replaces_config_port() {
        let mut config = HypervisorConfig::default();
        let overrides = CliOverrides {
            port: Some(9999),
            ..Default::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    fn reload_without_targets_still_forces_reload() {
        let mut config = HypervisorConfig::default();
        let overrides = CliOverrides {
            reload: Some(None),
            ..Default::default()
        };
        overrides.apply(&mut config);
        assert!(config.runtime.force_reload);
        assert_eq!(config.runtime.reload_targets, None);
    }

    #[test]
    fn absent_overrides_leave_defaults_untouched() {
        let mut config = HypervisorConfig::default();
        CliOverrides::default().apply(&mut config);
        assert_eq!(config.server.port, 8080);
        assert!(!config.runtime.force_reload);
    }
}
