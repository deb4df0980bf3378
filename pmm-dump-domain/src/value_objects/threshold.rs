// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Load Checker thresholds: which metrics to sample
//! and the percentages that separate OK / WAIT / TERMINATE.

use crate::error::DumpError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A sampled metric the Load Checker knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKey {
    /// Server-side CPU utilization, sampled via PromQL against the PMM
    /// server's own `/api/v1/query`.
    Cpu,
    /// Server-side RAM utilization, same mechanism as `Cpu`.
    Ram,
    /// The dumper's own heap usage divided by host total memory - sampled
    /// locally, not over the network.
    MyRam,
}

impl fmt::Display for ThresholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdKey::Cpu => "CPU",
            ThresholdKey::Ram => "RAM",
            ThresholdKey::MyRam => "MYRAM",
        })
    }
}

impl FromStr for ThresholdKey {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(ThresholdKey::Cpu),
            "RAM" => Ok(ThresholdKey::Ram),
            "MYRAM" => Ok(ThresholdKey::MyRam),
            other => Err(DumpError::validation(format!("unknown threshold key `{other}`"))),
        }
    }
}

/// The two percentages that govern one metric: at or above `max_load` the
/// checker reports WAIT, at or above `critical_load` it reports TERMINATE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub max_load: f64,
    pub critical_load: f64,
}

impl Threshold {
    pub fn new(max_load: f64, critical_load: f64) -> Self {
        Self { max_load, critical_load }
    }
}

/// The full set of thresholds for a transfer, keyed by metric.
#[derive(Debug, Clone, Default)]
pub struct Thresholds(HashMap<ThresholdKey, Threshold>);

impl Thresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ThresholdKey, threshold: Threshold) {
        self.0.insert(key, threshold);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ThresholdKey, &Threshold)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the CLI's `--max-load`/`--critical-load` comma lists, each of
    /// the form `KEY=PCT[,KEY=PCT...]`. Percentages for a key present in
    /// only one of the two flags keep the other at the conservative
    /// default (100%, i.e. never trips).
    pub fn parse(max_load: &str, critical_load: &str) -> Result<Self, DumpError> {
        let max = Self::parse_one_list(max_load)?;
        let critical = Self::parse_one_list(critical_load)?;

        let mut thresholds = Thresholds::new();
        for key in max.keys().chain(critical.keys()).copied().collect::<std::collections::HashSet<_>>() {
            thresholds.insert(
                key,
                Threshold::new(
                    max.get(&key).copied().unwrap_or(100.0),
                    critical.get(&key).copied().unwrap_or(100.0),
                ),
            );
        }
        Ok(thresholds)
    }

    fn parse_one_list(list: &str) -> Result<HashMap<ThresholdKey, f64>, DumpError> {
        let mut out = HashMap::new();
        if list.trim().is_empty() {
            return Ok(out);
        }
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (key, pct) = entry
                .split_once('=')
                .ok_or_else(|| DumpError::validation(format!("malformed threshold entry `{entry}`, expected KEY=PCT")))?;
            let key: ThresholdKey = key.trim().parse()?;
            let pct: f64 = pct
                .trim()
                .parse()
                .map_err(|_| DumpError::validation(format!("threshold percentage `{pct}` is not a number")))?;
            out.insert(key, pct);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_key_value_pairs() {
        let t = Thresholds::parse("CPU=80,RAM=90", "CPU=95,RAM=98").unwrap();
        let cpu = t.iter().find(|(k, _)| **k == ThresholdKey::Cpu).unwrap().1;
        assert_eq!(cpu.max_load, 80.0);
        assert_eq!(cpu.critical_load, 95.0);
    }

    #[test]
    fn missing_critical_defaults_to_non_tripping() {
        let t = Thresholds::parse("MYRAM=50", "").unwrap();
        let myram = t.iter().find(|(k, _)| **k == ThresholdKey::MyRam).unwrap().1;
        assert_eq!(myram.critical_load, 100.0);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Thresholds::parse("WAT=1", "").is_err());
    }
}
