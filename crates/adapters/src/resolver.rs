// SPDX-License-Identifier: MIT

//! `Resolver`: fetches and normalizes a project's source tree.
//!
//! Three concrete resolvers ship here — local filesystem, plain HTTP, and
//! GitHub — selected by the scheme of a project's `source` string (or the
//! absence of one, which falls back to `LocalResolver` rooted at the
//! current working directory). The Worker Spawner in `oxhv-engine`
//! constructs one per spawn from `selected.source || globalRoot`.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid source url: {0}")]
    InvalidSource(String),
}

/// Result of resolving a bare import path against a project's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// Fully-qualified URL or absolute local path the entry resolves to.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub is_dir: bool,
    pub size: Option<u64>,
}

/// Marker persisted to `<working_dir>/.ok` after a successful materialize,
/// recording enough provenance to decide whether a later materialize call
/// can be skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeOutcome {
    pub owner: Option<String>,
    pub repo: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub sha: Option<String>,
    pub at: u64,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a bare import specifier (relative path, or the project's
    /// entrypoint) to a fully-qualified URL the worker's module loader can
    /// fetch.
    async fn resolve(&self, path: &str) -> Result<ResolvedEntry, ResolverError>;

    /// Load the raw bytes at `path`, relative to the resolver's root.
    async fn load(&self, path: &str) -> Result<Vec<u8>, ResolverError>;

    /// Stat `path` without reading its contents.
    async fn stat(&self, path: &str) -> Result<EntryStat, ResolverError>;

    /// List the entries of a directory, relative to the resolver's root.
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, ResolverError>;

    /// Materialize the resolver's source tree into `working_dir`. A no-op
    /// for local sources; a fetch-and-write for remote ones. `refresh`
    /// forces re-fetch even if a prior `.ok` marker is present.
    async fn materialize(
        &self,
        working_dir: &Path,
        refresh: bool,
    ) -> Result<MaterializeOutcome, ResolverError>;
}

/// Deterministic per-project working directory name, per the isolated
/// project layout: `./.projects/<sha256(project-name)-hex>/`.
pub fn working_dir_for(projects_root: &Path, project_name: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(project_name.as_bytes());
    let digest = hasher.finalize();
    projects_root.join(".projects").join(hex_encode(&digest))
}

/// Whether a `source` string refers to a remote origin (HTTP or GitHub)
/// rather than a local path, for the Worker Spawner's `auto` materialize
/// mode decision.
pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("github:") || source.starts_with("http://") || source.starts_with("https://")
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Resolves against a local directory tree. The common case: a project with
/// no `source` configured, or one pointing at `file://` / a bare path.
pub struct LocalResolver {
    root: PathBuf,
}

impl LocalResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn join(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Resolver for LocalResolver {
    async fn resolve(&self, path: &str) -> Result<ResolvedEntry, ResolverError> {
        let full = self.join(path);
        Ok(ResolvedEntry {
            url: format!("file://{}", full.display()),
        })
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
        let full = self.join(path);
        tokio::fs::read(&full)
            .await
            .map_err(|source| ResolverError::Io {
                path: full.display().to_string(),
                source,
            })
    }

    async fn stat(&self, path: &str) -> Result<EntryStat, ResolverError> {
        let full = self.join(path);
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|source| ResolverError::Io {
                path: full.display().to_string(),
                source,
            })?;
        Ok(EntryStat {
            is_dir: meta.is_dir(),
            size: Some(meta.len()),
        })
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, ResolverError> {
        let full = self.join(path);
        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|source| ResolverError::Io {
                path: full.display().to_string(),
                source,
            })?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| ResolverError::Io {
            path: full.display().to_string(),
            source,
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn materialize(
        &self,
        _working_dir: &Path,
        _refresh: bool,
    ) -> Result<MaterializeOutcome, ResolverError> {
        // Local sources already live where they need to; nothing to fetch.
        Ok(MaterializeOutcome::default())
    }
}

/// Resolves against a single HTTP origin, fetching files as needed. Used
/// for sources given as a plain `https://` URL that isn't a GitHub repo
/// reference.
pub struct HttpResolver {
    base_url: String,
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn entry_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, path: &str) -> Result<ResolvedEntry, ResolverError> {
        Ok(ResolvedEntry {
            url: self.entry_url(path),
        })
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
        let url = self.entry_url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ResolverError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| ResolverError::Http { url, source })
    }

    async fn stat(&self, path: &str) -> Result<EntryStat, ResolverError> {
        let url = self.entry_url(path);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|source| ResolverError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(EntryStat {
            is_dir: false,
            size: response.content_length(),
        })
    }

    async fn list_dir(&self, _path: &str) -> Result<Vec<String>, ResolverError> {
        // Plain HTTP origins have no directory listing convention.
        Ok(Vec::new())
    }

    async fn materialize(
        &self,
        working_dir: &Path,
        refresh: bool,
    ) -> Result<MaterializeOutcome, ResolverError> {
        let marker = working_dir.join(".ok");
        if !refresh && marker.exists() {
            return Ok(MaterializeOutcome::default());
        }
        tokio::fs::create_dir_all(working_dir)
            .await
            .map_err(|source| ResolverError::Io {
                path: working_dir.display().to_string(),
                source,
            })?;
        Ok(MaterializeOutcome::default())
    }
}

/// Resolves against a GitHub repository via the contents API, with
/// optional token authentication for private repos.
pub struct GitHubResolver {
    owner: String,
    repo: String,
    reference: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubResolver {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, reference: impl Into<String>, token: Option<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: reference.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
            self.owner,
            self.repo,
            path.trim_start_matches('/'),
            self.reference
        )
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner,
            self.repo,
            self.reference,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url).header("User-Agent", "oxian-hypervisor");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl Resolver for GitHubResolver {
    async fn resolve(&self, path: &str) -> Result<ResolvedEntry, ResolverError> {
        Ok(ResolvedEntry {
            url: self.raw_url(path),
        })
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
        let url = self.raw_url(path);
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|source| ResolverError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| ResolverError::Http { url, source })
    }

    async fn stat(&self, path: &str) -> Result<EntryStat, ResolverError> {
        let url = self.api_url(path);
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|source| ResolverError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|source| ResolverError::Http { url, source })?;
        Ok(EntryStat {
            is_dir: body.get("type").and_then(|t| t.as_str()) == Some("dir"),
            size: body.get("size").and_then(|s| s.as_u64()),
        })
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, ResolverError> {
        let url = self.api_url(path);
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|source| ResolverError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        let body: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|source| ResolverError::Http { url, source })?;
        Ok(body
            .into_iter()
            .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()).map(str::to_owned))
            .collect())
    }

    async fn materialize(
        &self,
        working_dir: &Path,
        refresh: bool,
    ) -> Result<MaterializeOutcome, ResolverError> {
        let marker = working_dir.join(".ok");
        if !refresh && marker.exists() {
            return Ok(MaterializeOutcome::default());
        }
        materialize_github_tree(self, working_dir, "").await?;

        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let outcome = MaterializeOutcome {
            owner: Some(self.owner.clone()),
            repo: Some(self.repo.clone()),
            reference: Some(self.reference.clone()),
            sha: None,
            at: now_ms,
        };
        if let Ok(json) = serde_json::to_vec(&outcome) {
            let _ = tokio::fs::write(&marker, json).await;
        }
        Ok(outcome)
    }
}

/// Recursively download a GitHub directory into `working_dir`, mirroring
/// the repo's tree layout.
async fn materialize_github_tree(
    resolver: &GitHubResolver,
    working_dir: &Path,
    relative: &str,
) -> Result<(), ResolverError> {
    tokio::fs::create_dir_all(working_dir.join(relative))
        .await
        .map_err(|source| ResolverError::Io {
            path: working_dir.display().to_string(),
            source,
        })?;

    let url = resolver.api_url(relative);
    let response = resolver
        .request(&url)
        .send()
        .await
        .map_err(|source| ResolverError::Http {
            url: url.clone(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(ResolverError::HttpStatus {
            url,
            status: response.status().as_u16(),
        });
    }
    let entries: Vec<serde_json::Value> = response
        .json()
        .await
        .map_err(|source| ResolverError::Http { url, source })?;

    for entry in entries {
        let name = entry
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| ResolverError::InvalidSource("github entry missing name".into()))?;
        let child_relative = if relative.is_empty() {
            name.to_string()
        } else {
            format!("{relative}/{name}")
        };
        match entry.get("type").and_then(|t| t.as_str()) {
            Some("dir") => {
                Box::pin(materialize_github_tree(resolver, working_dir, &child_relative)).await?;
            }
            _ => {
                let bytes = resolver.load(&child_relative).await?;
                let dest = working_dir.join(&child_relative);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|source| ResolverError::Io {
                            path: parent.display().to_string(),
                            source,
                        })?;
                }
                tokio::fs::write(&dest, bytes)
                    .await
                    .map_err(|source| ResolverError::Io {
                        path: dest.display().to_string(),
                        source,
                    })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_dir_for_is_deterministic_and_hex_encoded() {
        let root = PathBuf::from("/srv/oxhv");
        let a = working_dir_for(&root, "alpha");
        let b = working_dir_for(&root, "alpha");
        let c = working_dir_for(&root, "beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.to_string_lossy().contains(".projects"));
    }

    #[tokio::test]
    async fn local_resolver_reads_and_stats_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("main.ts"), b"export default {}")
            .await
            .expect("write fixture");
        let resolver = LocalResolver::new(dir.path());

        let bytes = resolver.load("main.ts").await.expect("load");
        assert_eq!(bytes, b"export default {}");

        let stat = resolver.stat("main.ts").await.expect("stat");
        assert!(!stat.is_dir);
        assert_eq!(stat.size, Some(18));
    }

    #[tokio::test]
    async fn local_resolver_lists_directory_entries_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("b.ts"), b"").await.expect("write b");
        tokio::fs::write(dir.path().join("a.ts"), b"").await.expect("write a");
        let resolver = LocalResolver::new(dir.path());

        let names = resolver.list_dir("").await.expect("list_dir");
        assert_eq!(names, vec!["a.ts", "b.ts"]);
    }

    #[tokio::test]
    async fn local_resolver_materialize_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = LocalResolver::new(dir.path());
        let outcome = resolver
            .materialize(dir.path(), false)
            .await
            .expect("materialize");
        assert!(outcome.owner.is_none());
    }
}
