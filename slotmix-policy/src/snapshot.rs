//! Category-share snapshots over the rotation window
//!
//! A snapshot is always derived from the records the caller hands in and is
//! never persisted. Windowing is the record store's job; the builder only
//! counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rotation::RotationConstraints;
use crate::types::ContentRecord;

/// Category → share of the window, 0..1
pub type ShareMap = BTreeMap<String, f64>;

/// Share statistics for the recent window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub topic_distribution: ShareMap,
    pub angle_distribution: ShareMap,
    pub generator_distribution: ShareMap,
    pub format_distribution: ShareMap,
    /// Records in the window
    pub total_count: usize,
    pub window_days: u32,
    /// `topic:<name>:<pct>%` / `angle:<name>:<pct>%` for shares over their cap
    pub violations: Vec<String>,
}

impl DistributionSnapshot {
    /// Snapshot with no history, used when the record store is unavailable
    pub fn empty(window_days: u32) -> Self {
        Self {
            window_days,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    pub fn topic_share(&self, topic: &str) -> f64 {
        self.topic_distribution.get(topic).copied().unwrap_or(0.0)
    }

    pub fn angle_share(&self, angle: &str) -> f64 {
        self.angle_distribution.get(angle).copied().unwrap_or(0.0)
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Builds [`DistributionSnapshot`]s from windowed records
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionSnapshotBuilder;

impl DistributionSnapshotBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Count shares along every dimension and flag topic/angle violations
    pub fn build(
        &self,
        records: &[ContentRecord],
        window_days: u32,
        constraints: &RotationConstraints,
    ) -> DistributionSnapshot {
        let total = records.len();

        let topic_distribution = shares(records.iter().map(|r| r.topic_cluster.as_deref()), total);
        let angle_distribution = shares(records.iter().map(|r| r.angle.as_deref()), total);
        let generator_distribution = shares(records.iter().map(|r| r.generator.as_deref()), total);
        let format_distribution =
            shares(records.iter().map(|r| r.format_strategy.as_deref()), total);

        let mut violations = Vec::new();
        violations.extend(over_cap(
            "topic",
            &topic_distribution,
            constraints.max_share_per_topic,
        ));
        violations.extend(over_cap(
            "angle",
            &angle_distribution,
            constraints.max_share_per_angle,
        ));

        DistributionSnapshot {
            topic_distribution,
            angle_distribution,
            generator_distribution,
            format_distribution,
            total_count: total,
            window_days,
            violations,
        }
    }
}

/// Build a snapshot using the window length from the constraints
pub fn build_snapshot(
    records: &[ContentRecord],
    constraints: &RotationConstraints,
) -> DistributionSnapshot {
    DistributionSnapshotBuilder.build(records, constraints.window_days, constraints)
}

fn shares<'a>(values: impl Iterator<Item = Option<&'a str>>, total: usize) -> ShareMap {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values.flatten() {
        *counts.entry(value.to_string()).or_default() += 1;
    }

    let denominator = total.max(1) as f64;
    counts
        .into_iter()
        .map(|(category, count)| (category, count as f64 / denominator))
        .collect()
}

fn over_cap<'a>(
    dimension: &'a str,
    distribution: &'a ShareMap,
    max_share: f64,
) -> impl Iterator<Item = String> + 'a {
    distribution
        .iter()
        .filter(move |(_, share)| **share > max_share)
        .map(move |(name, share)| format!("{dimension}:{name}:{:.1}%", share * 100.0))
}
