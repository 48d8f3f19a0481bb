// SPDX-License-Identifier: MIT

//! Loading a `HypervisorConfig` from disk, then overlaying CLI overrides.

use crate::cli_overrides::CliOverrides;
use crate::model::HypervisorConfig;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from `path` (if given) and overlay `overrides` from
/// the command line. When `path` is `None`, a default configuration is used
/// — the hypervisor can run with nothing but CLI flags for a single
/// `"default"` project.
pub fn load(path: Option<&Path>, overrides: CliOverrides) -> Result<HypervisorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        }
        None => HypervisorConfig::default(),
    };

    overrides.apply(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_yields_default_config() {
        let config = load(None, CliOverrides::default()).expect("default config loads");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn loads_and_parses_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[server]\nport = 9090\n").expect("write");
        let config = load(Some(file.path()), CliOverrides::default()).expect("loads");
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load(Some(Path::new("/nonexistent/oxhv.toml")), CliOverrides::default())
            .expect_err("missing file errors");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
