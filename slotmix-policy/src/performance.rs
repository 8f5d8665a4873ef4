//! Performance summaries from post attribution rows
//!
//! Turns raw per-post engagement into the 0..1 scores the weighter expects.
//! Scores are relative: a slot performing exactly at the window average
//! scores 0.5, twice the average or better scores 1.0.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::StaticPerformanceSource;
use crate::types::{PerformanceSummary, window_start};

/// Engagement recorded for one published post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAttribution {
    pub post_id: String,
    pub content_slot: String,
    pub topic: Option<String>,
    pub generator_used: Option<String>,
    pub hook_pattern: Option<String>,
    pub engagement_rate: Option<f64>,
    pub impressions: Option<u64>,
    pub followers_gained: Option<i64>,
    pub posted_at: DateTime<Utc>,
}

/// Window-wide averages for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub total_posts: usize,
    pub avg_engagement: f64,
    pub avg_impressions: f64,
    pub avg_followers: f64,
    pub most_recent: Option<DateTime<Utc>>,
}

fn in_window<'a>(
    rows: &'a [PostAttribution],
    now: DateTime<Utc>,
    window_days: u32,
) -> impl Iterator<Item = &'a PostAttribution> {
    let cutoff = window_start(now, window_days);
    rows.iter().filter(move |r| r.posted_at >= cutoff)
}

/// Averages over the window; missing values count as zero
pub fn window_stats(rows: &[PostAttribution], now: DateTime<Utc>, window_days: u32) -> WindowStats {
    let mut stats = WindowStats::default();
    let (mut engagement, mut impressions, mut followers) = (0.0, 0.0, 0.0);

    for row in in_window(rows, now, window_days) {
        stats.total_posts += 1;
        engagement += row.engagement_rate.unwrap_or(0.0);
        impressions += row.impressions.unwrap_or(0) as f64;
        followers += row.followers_gained.unwrap_or(0) as f64;
        stats.most_recent = stats.most_recent.max(Some(row.posted_at));
    }

    if stats.total_posts > 0 {
        let n = stats.total_posts as f64;
        stats.avg_engagement = engagement / n;
        stats.avg_impressions = impressions / n;
        stats.avg_followers = followers / n;
    }
    stats
}

#[derive(Default)]
struct Accumulator {
    posts: u32,
    engagement: Mean,
    followers: Mean,
}

#[derive(Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn get(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Map a slot mean onto 0..1 with the overall mean at 0.5
fn relative_score(slot_mean: Option<f64>, overall_mean: Option<f64>) -> Option<f64> {
    match (slot_mean, overall_mean) {
        (Some(slot), Some(overall)) if overall > 0.0 => Some((slot / (2.0 * overall)).clamp(0.0, 1.0)),
        _ => None,
    }
}

/// Aggregate attribution rows in the window into per-slot summaries
pub fn aggregate_performance(
    rows: &[PostAttribution],
    now: DateTime<Utc>,
    window_days: u32,
) -> HashMap<String, PerformanceSummary> {
    let mut per_slot: HashMap<&str, Accumulator> = HashMap::new();
    let mut overall_engagement = Mean::default();
    let mut overall_followers = Mean::default();

    for row in in_window(rows, now, window_days) {
        let engagement = row.engagement_rate;
        let followers = row.followers_gained.map(|f| f as f64);
        overall_engagement.add(engagement);
        overall_followers.add(followers);

        let acc = per_slot.entry(row.content_slot.as_str()).or_default();
        acc.posts = acc.posts.saturating_add(1);
        acc.engagement.add(engagement);
        acc.followers.add(followers);
    }

    let overall_engagement = overall_engagement.get();
    let overall_followers = overall_followers.get();

    per_slot
        .into_iter()
        .map(|(slot, acc)| {
            let summary = PerformanceSummary {
                category: slot.to_string(),
                avg_primary_score: relative_score(acc.engagement.get(), overall_engagement),
                avg_secondary_score: relative_score(acc.followers.get(), overall_followers),
                sample_count: acc.posts,
            };
            (slot.to_string(), summary)
        })
        .collect()
}

impl StaticPerformanceSource {
    /// Source serving summaries aggregated from attribution rows
    pub fn from_attributions(rows: &[PostAttribution], now: DateTime<Utc>, window_days: u32) -> Self {
        Self::new(aggregate_performance(rows, now, window_days))
    }
}
