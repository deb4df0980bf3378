// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pure logic for the Selector Resolver: Grafana
//! template-variable interpolation and PromQL vector-selector label
//! rewriting. Implemented as pure functions, so they are testable without a Grafana server.
//!
//! This module implements a vector-selector label-matcher parser, not a
//! full PromQL grammar - the resolver only ever needs to rewrite the
//! `{label="value", ...}` matcher list of each selector found in a target
//! expression, never to evaluate the expression itself.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// One `label<op>"value"` matcher inside a `{...}` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub label: String,
    pub op: MatchOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    NotEq,
    Re,
    NotRe,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchOp::Eq => "=",
            MatchOp::NotEq => "!=",
            MatchOp::Re => "=~",
            MatchOp::NotRe => "!~",
        })
    }
}

/// A PromQL vector selector: an optional bare metric name plus its
/// `{...}` matcher list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSelector {
    pub metric_name: Option<String>,
    pub matchers: Vec<LabelMatcher>,
}

impl VectorSelector {
    pub fn render(&self) -> String {
        let body = self
            .matchers
            .iter()
            .map(|m| format!("{}{}\"{}\"", m.label, m.op, m.value))
            .collect::<Vec<_>>()
            .join(", ");
        match &self.metric_name {
            Some(name) => format!("{name}{{{body}}}"),
            None => format!("{{{body}}}"),
        }
    }

    /// Replaces (or adds) the matcher for `label`, pinning it to
    /// `^(name1|name2|...)$`.
    pub fn pinned_to(&self, label: &str, names: &[String]) -> Self {
        let pattern = format!("^({})$", names.join("|"));
        let mut matchers: Vec<LabelMatcher> =
            self.matchers.iter().filter(|m| m.label != label).cloned().collect();
        matchers.push(LabelMatcher {
            label: label.to_string(),
            op: MatchOp::Re,
            value: pattern,
        });
        Self {
            metric_name: self.metric_name.clone(),
            matchers,
        }
    }

    /// Drops matchers whose value still contains an unresolved
    /// placeholder; unknown-placeholder labels are dropped.
    pub fn without_unresolved_matchers(&self) -> Self {
        Self {
            metric_name: self.metric_name.clone(),
            matchers: self.matchers.iter().filter(|m| !m.value.contains('$')).cloned().collect(),
        }
    }
}

/// Finds every vector selector (`metric{...}` or bare `{...}`) in a PromQL
/// expression. Good enough for pmm-dump's purposes: it never needs to
/// understand operators, functions, or range vectors, only to locate and
/// rewrite selectors.
pub fn find_vector_selectors(expr: &str) -> Vec<VectorSelector> {
    let mut out = Vec::new();
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let end = match expr[i..].find('}') {
                Some(rel) => i + rel,
                None => break,
            };
            let body = &expr[i + 1..end];
            let name_end = expr[..i].rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'));
            let name_start = name_end.map(|p| p + 1).unwrap_or(0);
            let metric_name = if name_start < i {
                let candidate = &expr[name_start..i];
                if candidate.is_empty() {
                    None
                } else {
                    Some(candidate.to_string())
                }
            } else {
                None
            };
            out.push(VectorSelector {
                metric_name,
                matchers: parse_matchers(body),
            });
            i = end + 1;
        } else {
            i += 1;
        }
    }
    out
}

fn parse_matchers(body: &str) -> Vec<LabelMatcher> {
    split_top_level(body)
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            for (token, op) in [
                ("=~", MatchOp::Re),
                ("!~", MatchOp::NotRe),
                ("!=", MatchOp::NotEq),
                ("=", MatchOp::Eq),
            ] {
                if let Some((label, value)) = entry.split_once(token) {
                    return Some(LabelMatcher {
                        label: label.trim().to_string(),
                        op,
                        value: value.trim().trim_matches('"').to_string(),
                    });
                }
            }
            None
        })
        .collect()
}

/// Splits on commas that are not inside a quoted string.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// The closed set of `${var:format}` verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarFormat {
    Csv,
    Json,
    Pipe,
    DoubleQuote,
    SingleQuote,
    Raw,
}

impl VarFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "pipe" => Some(Self::Pipe),
            "doublequote" => Some(Self::DoubleQuote),
            "singlequote" => Some(Self::SingleQuote),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    pub fn render(self, values: &[String]) -> String {
        match self {
            VarFormat::Csv => values.join(","),
            VarFormat::Json => serde_json::to_string(values).unwrap_or_default(),
            VarFormat::Pipe => values.join("|"),
            VarFormat::DoubleQuote => values.iter().map(|v| format!("\"{v}\"")).collect::<Vec<_>>().join(","),
            VarFormat::SingleQuote => values.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(","),
            VarFormat::Raw => values.join(","),
        }
    }
}

/// One resolved Grafana template variable: its effective value set, after
/// `label_values`/`query_result`/`custom`/`constant` evaluation. `ignored` variables (datasource/adhoc/unsupported
/// globals) are omitted from this map entirely and fall through to the
/// "unresolved -> `1`" rule.
pub type ResolvedVariables = HashMap<String, Vec<String>>;

/// Interpolates `$var`, `${var}`, and `${var:format}` plus the time
/// macros `$__from`/`$__to`/`$__range` (and their `_s`/`_ms` variants)
/// against `[start, end]` (unix seconds).
/// Any remaining `$name` token is replaced with `1`, which is neutral in
/// arithmetic contexts.
pub fn interpolate(expr: &str, vars: &ResolvedVariables, start: i64, end: i64) -> String {
    let range_s = end - start;
    let mut out = expr
        .replace("$__from_ms", &(start * 1000).to_string())
        .replace("$__from_s", &start.to_string())
        .replace("$__from", &(start * 1000).to_string())
        .replace("$__to_ms", &(end * 1000).to_string())
        .replace("$__to_s", &end.to_string())
        .replace("$__to", &(end * 1000).to_string())
        .replace("$__range_ms", &(range_s * 1000).to_string())
        .replace("$__range_s", &range_s.to_string())
        .replace("$__range", &format!("{range_s}s"));

    out = interpolate_braced(&out, vars);
    out = interpolate_bare(&out, vars);
    out
}

fn interpolate_braced(expr: &str, vars: &ResolvedVariables) -> String {
    let mut out = String::with_capacity(expr.len());
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end_rel) = expr[i + 2..].find('}') {
                let end = i + 2 + end_rel;
                let inner = &expr[i + 2..end];
                let (name, format) = match inner.split_once(':') {
                    Some((n, f)) => (n, VarFormat::parse(f)),
                    None => (inner, None),
                };
                let rendered = match vars.get(name) {
                    Some(values) => format.unwrap_or(VarFormat::Pipe).render(values),
                    None => "1".to_string(),
                };
                out.push_str(&rendered);
                i = end + 1;
                continue;
            }
        }
        let ch = expr[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn interpolate_bare(expr: &str, vars: &ResolvedVariables) -> String {
    let mut out = String::with_capacity(expr.len());
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let name = &expr[start..end];
            let rendered = match vars.get(name) {
                Some(values) => VarFormat::Pipe.render(values),
                None => "1".to_string(),
            };
            out.push_str(&rendered);
            i = end;
        } else {
            let ch = expr[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

/// The label names pinned when `--instance`/service filters are supplied.
pub const SERVICE_PIN_LABELS: [&str; 3] = ["service_name", "instance", "node_name"];

pub fn dedup_selectors(selectors: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    selectors.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_metric_and_bare_selectors() {
        let found = find_vector_selectors(r#"rate(node_cpu{mode="idle", instance="$instance"}[5m]) + up{__name__=~".*"}"#);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].metric_name.as_deref(), Some("node_cpu"));
        assert_eq!(found[1].metric_name.as_deref(), Some("up"));
    }

    #[test]
    fn pinned_to_replaces_existing_matcher() {
        let sel = VectorSelector {
            metric_name: Some("up".into()),
            matchers: vec![LabelMatcher {
                label: "service_name".into(),
                op: MatchOp::Eq,
                value: "old".into(),
            }],
        };
        let pinned = sel.pinned_to("service_name", &["mongo".to_string()]);
        assert_eq!(pinned.render(), r#"up{service_name=~"^(mongo)$"}"#);
    }

    #[test]
    fn interpolates_named_variable_with_pipe_default() {
        let mut vars = ResolvedVariables::new();
        vars.insert("instance".into(), vec!["a".into(), "b".into()]);
        let out = interpolate(r#"up{instance=~"$instance"}"#, &vars, 0, 1);
        assert_eq!(out, r#"up{instance=~"a|b"}"#);
    }

    #[test]
    fn interpolates_braced_variable_with_csv_format() {
        let mut vars = ResolvedVariables::new();
        vars.insert("instance".into(), vec!["a".into(), "b".into()]);
        let out = interpolate("instances=${instance:csv}", &vars, 0, 1);
        assert_eq!(out, "instances=a,b");
    }

    #[test]
    fn unresolved_variable_collapses_to_one() {
        let out = interpolate("$missing + 1", &ResolvedVariables::new(), 0, 1);
        assert_eq!(out, "1 + 1");
    }

    #[test]
    fn time_macros_substitute_from_the_transfer_range() {
        let out = interpolate("start=$__from end=$__to range=$__range", &ResolvedVariables::new(), 1000, 5000);
        assert_eq!(out, "start=1000000 end=5000000 range=4000s");
    }

    #[test]
    fn without_unresolved_matchers_drops_unknown_placeholders() {
        let sel = VectorSelector {
            metric_name: Some("up".into()),
            matchers: vec![
                LabelMatcher {
                    label: "env".into(),
                    op: MatchOp::Eq,
                    value: "$unset".into(),
                },
                LabelMatcher {
                    label: "job".into(),
                    op: MatchOp::Eq,
                    value: "pmm".into(),
                },
            ],
        };
        let cleaned = sel.without_unresolved_matchers();
        assert_eq!(cleaned.matchers.len(), 1);
        assert_eq!(cleaned.matchers[0].label, "job");
    }

    #[test]
    fn dedup_removes_repeats_preserving_order() {
        let out = dedup_selectors(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }
}
