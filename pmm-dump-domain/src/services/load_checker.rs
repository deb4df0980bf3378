// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Load Checker: the port for sampling one
//! threshold metric, and the pure classification rule that turns a set of
//! samples into a [`LoadStatus`]. The polling loop itself (a background
//! task on a 1s ticker, a `parking_lot::RwLock<LatestStatus>`) is an
//! infrastructure concern and lives in `pmm_dump::infrastructure::runtime`.

use crate::error::DumpResult;
use crate::value_objects::{LoadStatus, ThresholdKey, Thresholds};
use async_trait::async_trait;

/// Samples one threshold metric's current load, as a percentage in
/// `[0, 100]` (can exceed 100 under genuine oversubscription).
#[async_trait]
pub trait LoadSampler: Send + Sync {
    async fn sample(&self, key: ThresholdKey) -> DumpResult<f64>;
}

/// Computes this tick's [`LoadStatus`] from a set of successfully sampled
/// percentages and the configured thresholds.
///
/// `Terminate` if any metric is at or above its
/// critical threshold, else `Wait` if any metric is at or above its max
/// threshold, else `Ok`. A metric absent from `thresholds` is not
/// evaluated (the caller is responsible for only sampling configured
/// keys).
pub fn classify(thresholds: &Thresholds, samples: &[(ThresholdKey, f64)]) -> LoadStatus {
    let mut any_wait = false;
    for (key, value) in samples {
        if let Some((_, threshold)) = thresholds.iter().find(|(k, _)| *k == key) {
            if *value >= threshold.critical_load {
                return LoadStatus::Terminate;
            }
            if *value >= threshold.max_load {
                any_wait = true;
            }
        }
    }
    if any_wait {
        LoadStatus::Wait
    } else {
        LoadStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Threshold;

    fn thresholds() -> Thresholds {
        let mut t = Thresholds::new();
        t.insert(ThresholdKey::Cpu, Threshold::new(80.0, 95.0));
        t.insert(ThresholdKey::Ram, Threshold::new(85.0, 97.0));
        t
    }

    #[test]
    fn all_under_max_is_ok() {
        let samples = [(ThresholdKey::Cpu, 10.0), (ThresholdKey::Ram, 20.0)];
        assert_eq!(classify(&thresholds(), &samples), LoadStatus::Ok);
    }

    #[test]
    fn one_metric_at_max_is_wait() {
        let samples = [(ThresholdKey::Cpu, 81.0), (ThresholdKey::Ram, 20.0)];
        assert_eq!(classify(&thresholds(), &samples), LoadStatus::Wait);
    }

    #[test]
    fn one_metric_at_critical_is_terminate_even_if_others_ok() {
        let samples = [(ThresholdKey::Cpu, 10.0), (ThresholdKey::Ram, 98.0)];
        assert_eq!(classify(&thresholds(), &samples), LoadStatus::Terminate);
    }

    #[test]
    fn unconfigured_metric_is_ignored() {
        let samples = [(ThresholdKey::MyRam, 99.9)];
        assert_eq!(classify(&thresholds(), &samples), LoadStatus::Ok);
    }
}
