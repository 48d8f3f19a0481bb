// SPDX-License-Identifier: MIT

//! Merging a project's native dependency manifest with an optional
//! host-level override into a single import map, emitted as a base64 data
//! URL for the worker's `--import-map` flag.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use oxhv_adapters::Resolver;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportMap {
    pub imports: BTreeMap<String, String>,
    pub scopes: BTreeMap<String, BTreeMap<String, String>>,
}

impl ImportMap {
    pub fn from_json(raw: &[u8]) -> Self {
        let Ok(Value::Object(doc)) = serde_json::from_slice::<Value>(raw) else {
            return Self::default();
        };
        Self {
            imports: string_map(doc.get("imports")),
            scopes: doc
                .get("scopes")
                .and_then(Value::as_object)
                .map(|scopes| {
                    scopes
                        .iter()
                        .map(|(scope, mapping)| (scope.clone(), string_map(Some(mapping))))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Merge `host` on top of `self` (the built-in manifest): host entries
    /// override built-in entries with the same key, per the spec's "host
    /// overrides built-in" rule.
    pub fn merged_with(mut self, host: Option<ImportMap>) -> Self {
        if let Some(host) = host {
            for (specifier, target) in host.imports {
                self.imports.insert(specifier, target);
            }
            for (scope, mapping) in host.scopes {
                let entry = self.scopes.entry(scope).or_default();
                for (specifier, target) in mapping {
                    entry.insert(specifier, target);
                }
            }
        }
        self
    }

    /// Rewrite every bare (schemeless) import target through `resolver`,
    /// per the spec's §4.2 step 4: built-in and host entries alike may name
    /// a bare specifier meant to resolve against the project's own source,
    /// and the worker's module loader expects a fully-qualified URL on the
    /// wire. A target already carrying a URL scheme (`scheme://...`) is left
    /// untouched; a target the resolver can't resolve is left as-is too,
    /// rather than dropping the mapping.
    pub async fn rewrite_bare_specifiers(mut self, resolver: &dyn Resolver) -> Self {
        for target in self.imports.values_mut() {
            rewrite_one(target, resolver).await;
        }
        for mapping in self.scopes.values_mut() {
            for target in mapping.values_mut() {
                rewrite_one(target, resolver).await;
            }
        }
        self
    }

    pub fn to_data_url(&self) -> String {
        let mut imports = Map::new();
        for (k, v) in &self.imports {
            imports.insert(k.clone(), Value::String(v.clone()));
        }
        let mut scopes = Map::new();
        for (scope, mapping) in &self.scopes {
            let mut inner = Map::new();
            for (k, v) in mapping {
                inner.insert(k.clone(), Value::String(v.clone()));
            }
            scopes.insert(scope.clone(), Value::Object(inner));
        }
        let mut doc = Map::new();
        doc.insert("imports".to_string(), Value::Object(imports));
        doc.insert("scopes".to_string(), Value::Object(scopes));
        let json = Value::Object(doc).to_string();
        format!("data:application/json;base64,{}", STANDARD.encode(json))
    }
}

/// A target is "bare" (needs rewriting) when it carries no URL scheme.
fn is_bare_specifier(target: &str) -> bool {
    !target.contains("://")
}

async fn rewrite_one(target: &mut String, resolver: &dyn Resolver) {
    if !is_bare_specifier(target) {
        return;
    }
    if let Ok(resolved) = resolver.resolve(target).await {
        *target = resolved.url;
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_entries_override_built_in_entries() {
        let built_in = ImportMap::from_json(br#"{"imports":{"std/":"https://deno.land/std/"}}"#);
        let host = ImportMap::from_json(br#"{"imports":{"std/":"https://example.com/std/"}}"#);
        let merged = built_in.merged_with(Some(host));
        assert_eq!(
            merged.imports.get("std/").map(String::as_str),
            Some("https://example.com/std/")
        );
    }

    #[test]
    fn merge_with_no_host_keeps_built_in_untouched() {
        let built_in = ImportMap::from_json(br#"{"imports":{"a":"b"}}"#);
        let merged = built_in.clone().merged_with(None);
        assert_eq!(merged, built_in);
    }

    #[test]
    fn to_data_url_round_trips_as_valid_base64_json() {
        let map = ImportMap::from_json(br#"{"imports":{"a":"b"}}"#);
        let url = map.to_data_url();
        let encoded = url.strip_prefix("data:application/json;base64,").expect("prefix");
        let decoded = STANDARD.decode(encoded).expect("valid base64");
        let value: Value = serde_json::from_slice(&decoded).expect("valid json");
        assert_eq!(value["imports"]["a"], "b");
    }

    #[test]
    fn malformed_json_yields_an_empty_map() {
        let map = ImportMap::from_json(b"not json");
        assert!(map.imports.is_empty());
    }

    #[tokio::test]
    async fn rewrite_bare_specifiers_resolves_through_the_project_resolver() {
        let map = ImportMap::from_json(br#"{
            "imports": {"app/": "src/", "std/": "https://deno.land/std/"},
            "scopes": {"./lib/": {"dep": "dep.ts"}}
        }"#);
        let resolver = oxhv_adapters::LocalResolver::new("/srv/oxhv/projects/alpha");
        let rewritten = map.rewrite_bare_specifiers(&resolver).await;

        assert_eq!(
            rewritten.imports.get("app/").map(String::as_str),
            Some("file:///srv/oxhv/projects/alpha/src/")
        );
        // Already-qualified targets are left untouched.
        assert_eq!(
            rewritten.imports.get("std/").map(String::as_str),
            Some("https://deno.land/std/")
        );
        assert_eq!(
            rewritten.scopes.get("./lib/").and_then(|m| m.get("dep")).map(String::as_str),
            Some("file:///srv/oxhv/projects/alpha/dep.ts")
        );
    }
}
