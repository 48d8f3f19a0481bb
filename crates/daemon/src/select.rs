// SPDX-License-Identifier: MIT

//! The Selector (specification §4.1): map an incoming request to a
//! [`SelectedProject`].
//!
//! A user-supplied [`ProjectSelector`] provider, when present, always wins.
//! Otherwise the declarative `select` rules in [`HypervisorConfig`] are
//! walked in declaration order; the first rule whose `when` predicates all
//! match wins, falling back to whichever rule is marked `default: true`, and
//! finally to the `"default"` project sentinel if nothing matches at all.

use axum::http::{HeaderMap, Method, Uri};
use oxhv_adapters::selector::{SelectionError, SelectionRequest};
use oxhv_adapters::ProjectSelector;
use oxhv_config::select::header_value_matches;
use oxhv_config::{HypervisorConfig, SelectRule, When};
use oxhv_core::{HypervisorError, ProjectName, SelectedProject};
use std::collections::HashMap;

/// Resolve a [`SelectedProject`] for one request, per the provider-then-
/// rules precedence described above.
pub async fn select_project(
    config: &HypervisorConfig,
    provider: Option<&dyn ProjectSelector>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<SelectedProject, HypervisorError> {
    if let Some(provider) = provider {
        let request = to_selection_request(method, uri, headers);
        match provider.select(&request).await {
            Ok(Some(selected)) => return Ok(selected),
            Ok(None) => {} // defer to declarative rules
            Err(SelectionError::Failed(message)) => return Err(HypervisorError::Selection(message)),
        }
    }

    Ok(select_via_rules(&config.select, method, uri, headers))
}

fn to_selection_request(method: &Method, uri: &Uri, headers: &HeaderMap) -> SelectionRequest {
    let mut header_map = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    SelectionRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        headers: header_map,
    }
}

/// Walk `rules` in order, returning the first match; fall back to the rule
/// marked `default: true`; fall back to the `"default"` project sentinel.
fn select_via_rules(rules: &[SelectRule], method: &Method, uri: &Uri, headers: &HeaderMap) -> SelectedProject {
    let mut fallback: Option<&SelectRule> = None;

    for rule in rules {
        if rule.default {
            fallback.get_or_insert(rule);
            continue;
        }
        if rule_matches(rule, method, uri, headers) {
            return selected_from_rule(rule);
        }
    }

    match fallback {
        Some(rule) => selected_from_rule(rule),
        None => SelectedProject::default_project(),
    }
}

fn rule_matches(rule: &SelectRule, method: &Method, uri: &Uri, headers: &HeaderMap) -> bool {
    match &rule.when {
        None => false,
        Some(when) => when_matches(when, method, uri, headers),
    }
}

fn when_matches(when: &When, method: &Method, uri: &Uri, headers: &HeaderMap) -> bool {
    if let Some(prefix) = &when.path_prefix {
        if !uri.path().starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(expected) = &when.method {
        if !method.as_str().eq_ignore_ascii_case(expected) {
            return false;
        }
    }
    // Server-side requests carry the authority in the `Host` header, not in
    // `Uri::host()` (which is only populated for absolute-form URIs).
    let host_header = headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok());
    let host = host_header.map(|h| h.rsplit_once(':').map(|(h, _)| h).unwrap_or(h));
    if let Some(expected) = &when.host_equals {
        if host != Some(expected.as_str()) {
            return false;
        }
    }
    if let Some(prefix) = &when.host_prefix {
        if !host.map(|h| h.starts_with(prefix.as_str())).unwrap_or(false) {
            return false;
        }
    }
    if let Some(suffix) = &when.host_suffix {
        if !host.map(|h| h.ends_with(suffix.as_str())).unwrap_or(false) {
            return false;
        }
    }
    for (header_name, pattern) in &when.header {
        let observed = headers
            .get(header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !header_value_matches(pattern, observed) {
            return false;
        }
    }
    true
}

fn selected_from_rule(rule: &SelectRule) -> SelectedProject {
    let mut selected = SelectedProject::for_project(ProjectName::new(rule.project.clone()));
    selected.source = rule.source.clone();
    selected.strip_path_prefix = rule.strip_path_prefix.clone();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn req(path: &str) -> (Method, Uri, HeaderMap) {
        (Method::GET, path.parse().expect("uri"), HeaderMap::new())
    }

    #[test]
    fn no_rules_selects_default_project() {
        let (method, uri, headers) = req("/anything");
        let selected = select_via_rules(&[], &method, &uri, &headers);
        assert!(selected.project.is_default());
    }

    #[test]
    fn first_matching_rule_wins_in_declaration_order() {
        let rules = vec![
            SelectRule {
                when: Some(When { path_prefix: Some("/a".into()), ..Default::default() }),
                project: "alpha".into(),
                ..Default::default()
            },
            SelectRule {
                when: Some(When { path_prefix: Some("/".into()), ..Default::default() }),
                project: "catch-all".into(),
                ..Default::default()
            },
        ];
        let (method, uri, headers) = req("/a/thing");
        let selected = select_via_rules(&rules, &method, &uri, &headers);
        assert_eq!(selected.project.as_str(), "alpha");
    }

    #[test]
    fn default_rule_is_the_fallback_sentinel_not_a_match_target() {
        let rules = vec![
            SelectRule { default: true, project: "fallback".into(), ..Default::default() },
            SelectRule {
                when: Some(When { path_prefix: Some("/only".into()), ..Default::default() }),
                project: "specific".into(),
                ..Default::default()
            },
        ];
        let (method, uri, headers) = req("/elsewhere");
        let selected = select_via_rules(&rules, &method, &uri, &headers);
        assert_eq!(selected.project.as_str(), "fallback");
    }

    #[test]
    fn header_rule_matches_case_insensitive_header_name() {
        let rules = vec![SelectRule {
            when: Some(When {
                header: HashMap::from([("x-p".to_string(), "alpha".to_string())]),
                ..Default::default()
            }),
            project: "alpha".into(),
            ..Default::default()
        }];
        let (method, uri, mut headers) = req("/anything");
        headers.insert("X-P", HeaderValue::from_static("alpha"));
        let selected = select_via_rules(&rules, &method, &uri, &headers);
        assert_eq!(selected.project.as_str(), "alpha");
    }

    #[test]
    fn non_matching_header_falls_through_to_default() {
        let rules = vec![SelectRule {
            when: Some(When {
                header: HashMap::from([("x-p".to_string(), "alpha".to_string())]),
                ..Default::default()
            }),
            project: "alpha".into(),
            ..Default::default()
        }];
        let (method, uri, headers) = req("/anything");
        let selected = select_via_rules(&rules, &method, &uri, &headers);
        assert!(selected.project.is_default());
    }
}
