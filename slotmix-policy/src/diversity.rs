//! Advisory diversity health check
//!
//! Looks at the most recent output and reports patterns operators should
//! know about. Nothing here feeds back into selection.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::ContentRecord;

/// Visual formats that count as "no visual treatment"
const PLAIN_VISUALS: &[&str] = &["plain", "blank", ""];

/// Thresholds for the diversity health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    /// Records needed before any judgement is made (default: 20)
    pub min_sample: usize,
    /// Most recent records evaluated (default: 50)
    pub window_size: usize,
    /// Largest share one generator may hold (default: 0.4)
    pub max_generator_share: f64,
    /// Fewest distinct format strategies considered diverse (default: 10)
    pub min_format_strategies: usize,
    /// Largest share of plain/blank visuals (default: 0.7)
    pub max_plain_visual_share: f64,
    /// Largest records-per-topic ratio (default: 2.0)
    pub max_topic_reuse: f64,
    /// Days of history requested from the record source (default: 30)
    pub lookback_days: u32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            min_sample: 20,
            window_size: 50,
            max_generator_share: 0.4,
            min_format_strategies: 10,
            max_plain_visual_share: 0.7,
            max_topic_reuse: 2.0,
            lookback_days: 30,
        }
    }
}

/// Outcome of a diversity health check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiversityHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub fixes: Vec<String>,
    /// Records actually evaluated
    pub sample_size: usize,
}

impl DiversityHealth {
    fn insufficient_data(sample_size: usize) -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
            fixes: Vec::new(),
            sample_size,
        }
    }
}

/// Checks recent output for generator, format, visual and topic diversity
#[derive(Debug, Clone, Default)]
pub struct DiversityMonitor {
    config: DiversityConfig,
}

impl DiversityMonitor {
    pub fn new(config: DiversityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiversityConfig {
        &self.config
    }

    pub fn check_health(&self, records: &[ContentRecord]) -> DiversityHealth {
        if records.len() < self.config.min_sample {
            return DiversityHealth::insufficient_data(records.len());
        }

        let mut recent: Vec<&ContentRecord> = records.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(self.config.window_size);

        let mut issues = Vec::new();
        let mut fixes = Vec::new();
        let n = recent.len() as f64;

        // Generator dominance
        let mut generators: HashMap<&str, usize> = HashMap::new();
        for generator in recent.iter().filter_map(|r| r.generator.as_deref()) {
            *generators.entry(generator).or_default() += 1;
        }
        if let Some((generator, count)) = generators
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        {
            let share = *count as f64 / n;
            if share > self.config.max_generator_share {
                issues.push(format!(
                    "generator '{generator}' produced {:.0}% of recent content",
                    share * 100.0
                ));
                fixes.push("force even distribution across generators".to_string());
            }
        }

        // Format diversity
        let formats: HashSet<&str> = recent
            .iter()
            .filter_map(|r| r.format_strategy.as_deref())
            .collect();
        if formats.len() < self.config.min_format_strategies {
            issues.push(format!(
                "only {} distinct format strategies: converging on patterns",
                formats.len()
            ));
            fixes.push("rotate format strategies and seed new ones".to_string());
        }

        // Visual diversity
        let plain = recent.iter().filter(|r| is_plain_visual(r)).count();
        let plain_share = plain as f64 / n;
        if plain_share > self.config.max_plain_visual_share {
            issues.push(format!(
                "{:.0}% of recent content uses a plain visual format",
                plain_share * 100.0
            ));
            fixes.push("vary visual formatting".to_string());
        }

        // Topic reuse
        let topics: HashSet<&str> = recent
            .iter()
            .filter_map(|r| r.topic_cluster.as_deref())
            .collect();
        if !topics.is_empty() {
            let reuse = n / topics.len() as f64;
            if reuse > self.config.max_topic_reuse {
                issues.push(format!(
                    "topics reused: {:.1} posts per topic across {} topics",
                    reuse,
                    topics.len()
                ));
                fixes.push("broaden topic selection".to_string());
            }
        }

        DiversityHealth {
            healthy: issues.is_empty(),
            issues,
            fixes,
            sample_size: recent.len(),
        }
    }
}

/// Check diversity health with the default thresholds
pub fn check_diversity_health(records: &[ContentRecord]) -> DiversityHealth {
    DiversityMonitor::default().check_health(records)
}

fn is_plain_visual(record: &ContentRecord) -> bool {
    match record.visual_format.as_deref() {
        None => true,
        Some(visual) => PLAIN_VISUALS
            .iter()
            .any(|p| visual.trim().eq_ignore_ascii_case(p)),
    }
}
