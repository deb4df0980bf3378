// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Selector Resolver infrastructure: the Grafana
//! HTTP orchestration around the pure matcher/interpolation logic in
//! [`pmm_dump_domain::services::selector_resolver`]. Dashboard JSON is
//! walked generically with `serde_json::Value` rather than a typed model,
//! since this only ever needs two fields (`panels[].targets[].expr` and
//! `templating.list[]`) out of Grafana's much larger schema.

use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::selector_resolver::{
    dedup_selectors, find_vector_selectors, interpolate, ResolvedVariables, SERVICE_PIN_LABELS,
};
use regex::Regex;
use reqwest::Client;
use serde_json::Value as Json;
use std::sync::LazyLock;

use crate::infrastructure::http_client;

static LABEL_VALUES_TWO_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^label_values\(\s*([^,]+?)\s*,\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)$"#).unwrap());
static LABEL_VALUES_ONE_ARG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^label_values\(\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)$"#).unwrap());
static QUERY_RESULT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^query_result\(\s*(.+)\s*\)$"#).unwrap());

pub struct SelectorResolver {
    client: Client,
    base_url: String,
}

impl SelectorResolver {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    /// Expands dashboard names + service names + explicit selectors into
    /// the final, deduplicated `match[]` list.
    pub async fn resolve(
        &self,
        dashboards: &[String],
        service_names: &[String],
        explicit_selectors: &[String],
        start: i64,
        end: i64,
    ) -> DumpResult<Vec<String>> {
        let mut selectors: Vec<String> = explicit_selectors.to_vec();

        for dashboard in dashboards {
            let uid = self.search_dashboard_uid(dashboard).await?;
            let definition = self.fetch_dashboard(&uid).await?;
            let targets = collect_prometheus_targets(&definition);
            let vars = self.resolve_template_variables(&definition, start, end).await?;

            for expr in targets {
                let interpolated = interpolate(&expr, &vars, start, end);
                for selector in find_vector_selectors(&interpolated) {
                    let cleaned = selector.without_unresolved_matchers();
                    if service_names.is_empty() {
                        selectors.push(cleaned.render());
                    } else {
                        for label in SERVICE_PIN_LABELS {
                            selectors.push(cleaned.pinned_to(label, service_names).render());
                        }
                    }
                }
            }
        }

        Ok(dedup_selectors(selectors))
    }

    async fn search_dashboard_uid(&self, name: &str) -> DumpResult<String> {
        let url = format!("{}/api/search?query={}&type=dash-db", self.base_url, urlencode(name));
        let response = http_client::get_with_retries(&self.client, &url).await?;
        let results: Json = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
        let results = results.as_array().ok_or_else(|| DumpError::network("Grafana search returned a non-array body"))?;

        results
            .iter()
            .find(|r| r["title"].as_str().is_some_and(|t| t.eq_ignore_ascii_case(name)))
            .or_else(|| results.first())
            .and_then(|r| r["uid"].as_str())
            .map(str::to_string)
            .ok_or_else(|| DumpError::validation(format!("no Grafana dashboard found matching `{name}`")))
    }

    async fn fetch_dashboard(&self, uid: &str) -> DumpResult<Json> {
        let url = format!("{}/api/dashboards/uid/{uid}", self.base_url);
        let response = http_client::get_with_retries(&self.client, &url).await?;
        let body: Json = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
        Ok(body.get("dashboard").cloned().unwrap_or(body))
    }

    async fn resolve_template_variables(&self, dashboard: &Json, start: i64, end: i64) -> DumpResult<ResolvedVariables> {
        let mut vars = ResolvedVariables::new();
        let Some(list) = dashboard["templating"]["list"].as_array() else {
            return Ok(vars);
        };
        for var in list {
            let Some(name) = var["name"].as_str() else { continue };
            if let Some(values) = self.resolve_one_variable(var, start, end).await? {
                vars.insert(name.to_string(), values);
            }
        }
        Ok(vars)
    }

    async fn resolve_one_variable(&self, var: &Json, start: i64, end: i64) -> DumpResult<Option<Vec<String>>> {
        match classify_variable(var) {
            VariableKind::LabelValuesMetricLabel { metric, label } => {
                let url = format!("{}/prometheus/api/v1/series?match[]={}&start={start}&end={end}", self.base_url, urlencode(&metric));
                let response = http_client::get_with_retries(&self.client, &url).await?;
                let body: Json = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
                let mut values: Vec<String> = body["data"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|series| series.get(&label).and_then(Json::as_str).map(str::to_string))
                    .collect();
                values.sort();
                values.dedup();
                Ok(Some(values))
            }
            VariableKind::LabelValuesLabel { label } => {
                let url = format!("{}/api/v1/label/{label}/values", self.base_url);
                let response = http_client::get_with_retries(&self.client, &url).await?;
                let body: Json = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
                let values = body["data"].as_array().into_iter().flatten().filter_map(|v| v.as_str().map(str::to_string)).collect();
                Ok(Some(values))
            }
            VariableKind::QueryResult { expr } => {
                let url = format!("{}/api/v1/query?query={}", self.base_url, urlencode(&expr));
                let response = http_client::get_with_retries(&self.client, &url).await?;
                let body: Json = response.json().await.map_err(|e| DumpError::network(e.to_string()))?;
                let scalar = body["data"]["result"][0]["value"][1].as_str().map(str::to_string);
                Ok(scalar.map(|s| vec![s]))
            }
            VariableKind::Custom(values) => Ok(Some(values)),
            VariableKind::Constant(value) => Ok(Some(vec![value])),
            VariableKind::Ignored => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum VariableKind {
    LabelValuesMetricLabel { metric: String, label: String },
    LabelValuesLabel { label: String },
    QueryResult { expr: String },
    Custom(Vec<String>),
    Constant(String),
    Ignored,
}

/// Classifies one `templating.list[]` entry by its Grafana variable type.
fn classify_variable(var: &Json) -> VariableKind {
    match var["type"].as_str().unwrap_or("") {
        "custom" => {
            let values = var["options"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|o| o["value"].as_str().map(str::to_string))
                .collect();
            VariableKind::Custom(values)
        }
        "constant" => VariableKind::Constant(var["query"].as_str().unwrap_or_default().to_string()),
        "query" => {
            let query = var["query"].as_str().unwrap_or_else(|| var["query"]["query"].as_str().unwrap_or_default());
            if let Some(caps) = LABEL_VALUES_TWO_ARG.captures(query.trim()) {
                VariableKind::LabelValuesMetricLabel { metric: caps[1].to_string(), label: caps[2].to_string() }
            } else if let Some(caps) = LABEL_VALUES_ONE_ARG.captures(query.trim()) {
                VariableKind::LabelValuesLabel { label: caps[1].to_string() }
            } else if let Some(caps) = QUERY_RESULT.captures(query.trim()) {
                VariableKind::QueryResult { expr: caps[1].to_string() }
            } else {
                VariableKind::Ignored
            }
        }
        _ => VariableKind::Ignored, // datasource, adhoc, and unsupported Grafana globals
    }
}

/// Recursively walks `panels[]` (including nested rows) collecting every
/// `targets[].expr` whose datasource is Prometheus/VM-compatible.
fn collect_prometheus_targets(dashboard: &Json) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(panels) = dashboard["panels"].as_array() {
        walk_panels(panels, &mut out);
    }
    out
}

fn walk_panels(panels: &[Json], out: &mut Vec<String>) {
    for panel in panels {
        if let Some(nested) = panel["panels"].as_array() {
            walk_panels(nested, out);
        }
        let Some(targets) = panel["targets"].as_array() else { continue };
        for target in targets {
            if !is_prometheus_target(target) {
                continue;
            }
            if let Some(expr) = target["expr"].as_str() {
                out.push(expr.to_string());
            }
        }
    }
}

fn is_prometheus_target(target: &Json) -> bool {
    match target["datasource"]["type"].as_str() {
        Some(t) => t.eq_ignore_ascii_case("prometheus"),
        // No datasource override on the target: inherits the panel's, which
        // this simplified walk doesn't track separately - treat as eligible
        // rather than silently dropping metrics from untyped targets.
        None => true,
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_label_values_with_metric_and_label() {
        let var = json!({"type": "query", "query": "label_values(node_cpu, instance)"});
        assert_eq!(classify_variable(&var), VariableKind::LabelValuesMetricLabel { metric: "node_cpu".into(), label: "instance".into() });
    }

    #[test]
    fn classifies_label_values_with_label_only() {
        let var = json!({"type": "query", "query": "label_values(job)"});
        assert_eq!(classify_variable(&var), VariableKind::LabelValuesLabel { label: "job".into() });
    }

    #[test]
    fn classifies_query_result() {
        let var = json!({"type": "query", "query": "query_result(up == 1)"});
        assert_eq!(classify_variable(&var), VariableKind::QueryResult { expr: "up == 1".into() });
    }

    #[test]
    fn classifies_custom_and_constant_and_ignored() {
        let custom = json!({"type": "custom", "options": [{"value": "a"}, {"value": "b"}]});
        assert_eq!(classify_variable(&custom), VariableKind::Custom(vec!["a".into(), "b".into()]));

        let constant = json!({"type": "constant", "query": "5m"});
        assert_eq!(classify_variable(&constant), VariableKind::Constant("5m".into()));

        let datasource = json!({"type": "datasource"});
        assert_eq!(classify_variable(&datasource), VariableKind::Ignored);
    }

    #[test]
    fn collects_targets_from_nested_row_panels() {
        let dashboard = json!({
            "panels": [
                {
                    "panels": [
                        {"targets": [{"expr": "rate(up[5m])", "datasource": {"type": "prometheus"}}]}
                    ]
                },
                {"targets": [{"expr": "node_cpu", "datasource": {"type": "loki"}}]},
                {"targets": [{"expr": "node_memory"}]}
            ]
        });
        let targets = collect_prometheus_targets(&dashboard);
        assert_eq!(targets, vec!["rate(up[5m])".to_string(), "node_memory".to_string()]);
    }
}
