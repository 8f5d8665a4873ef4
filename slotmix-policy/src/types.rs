//! Value types shared across the policy components
//!
//! Everything here is a call-scoped value object: created per invocation,
//! compared by fields, discarded after use.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Category identifier → selection probability.
///
/// Ordered so that iteration (and therefore seeded sampling) is reproducible.
pub type CategoryWeights = BTreeMap<String, f64>;

/// Opaque per-candidate annotations.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Aggregated engagement for one slot, produced by the data layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub category: String,
    /// Primary objective score on a 0..1 scale, 0.5 is neutral
    pub avg_primary_score: Option<f64>,
    pub avg_secondary_score: Option<f64>,
    pub sample_count: u32,
}

impl PerformanceSummary {
    pub fn new(category: impl Into<String>, avg_primary_score: Option<f64>, sample_count: u32) -> Self {
        Self {
            category: category.into(),
            avg_primary_score,
            avg_secondary_score: None,
            sample_count,
        }
    }

    #[must_use]
    pub fn with_secondary(mut self, score: f64) -> Self {
        self.avg_secondary_score = Some(score);
        self
    }
}

/// A concrete piece of content competing for the next posting slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCandidate {
    pub id: String,
    pub topic_cluster: String,
    pub angle: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ContentCandidate {
    pub fn new(
        id: impl Into<String>,
        topic_cluster: impl Into<String>,
        angle: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            topic_cluster: topic_cluster.into(),
            angle: angle.into(),
            score,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A previously published piece of content, as returned by the record store
///
/// Dimensions are optional because older rows predate some of them; a record
/// missing a dimension is simply not counted along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub topic_cluster: Option<String>,
    pub angle: Option<String>,
    pub generator: Option<String>,
    pub format_strategy: Option<String>,
    pub visual_format: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            topic_cluster: None,
            angle: None,
            generator: None,
            format_strategy: None,
            visual_format: None,
            created_at,
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_cluster = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_angle(mut self, angle: impl Into<String>) -> Self {
        self.angle = Some(angle.into());
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format_strategy = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_visual(mut self, visual: impl Into<String>) -> Self {
        self.visual_format = Some(visual.into());
        self
    }
}

/// Follower growth direction reported by the growth evaluator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthTrend {
    Declining,
    #[default]
    Flat,
    Growing,
    Accelerating,
}

impl GrowthTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declining => "declining",
            Self::Flat => "flat",
            Self::Growing => "growing",
            Self::Accelerating => "accelerating",
        }
    }

    /// All trends for iteration
    pub fn all() -> &'static [GrowthTrend] {
        &[
            Self::Declining,
            Self::Flat,
            Self::Growing,
            Self::Accelerating,
        ]
    }
}

impl std::fmt::Display for GrowthTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing GrowthTrend from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGrowthTrendError(String);

impl std::fmt::Display for ParseGrowthTrendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown growth trend: {}", self.0)
    }
}

impl std::error::Error for ParseGrowthTrendError {}

impl FromStr for GrowthTrend {
    type Err = ParseGrowthTrendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declining" => Ok(Self::Declining),
            "flat" => Ok(Self::Flat),
            "growing" => Ok(Self::Growing),
            "accelerating" => Ok(Self::Accelerating),
            _ => Err(ParseGrowthTrendError(s.to_string())),
        }
    }
}

/// Exploration/exploitation split for one selection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationDecision {
    /// Probability of drawing a slot uniformly instead of by weight
    pub rate: f64,
    pub reasoning: String,
}

/// Longest lookback any window setting may request (ten years)
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Earliest instant inside a window of `window_days` ending at `now`
///
/// Saturates at the earliest representable time instead of overflowing.
/// A record is in the window when its timestamp is `>=` this value.
pub fn window_start(now: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(window_days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_regular_window() {
        let now = Utc::now();
        assert_eq!(window_start(now, 7), now - Duration::days(7));
    }

    #[test]
    fn test_window_start_saturates_on_huge_window() {
        let now = Utc::now();
        assert_eq!(window_start(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_growth_trend_roundtrip() {
        for trend in GrowthTrend::all() {
            let parsed = GrowthTrend::from_str(trend.as_str()).unwrap();
            assert_eq!(*trend, parsed);
        }
    }

    #[test]
    fn test_growth_trend_parse_error() {
        let err = GrowthTrend::from_str("sideways").unwrap_err();
        assert_eq!(err.to_string(), "unknown growth trend: sideways");
    }

    #[test]
    fn test_growth_trend_serde_snake_case() {
        let json = serde_json::to_string(&GrowthTrend::Accelerating).unwrap();
        assert_eq!(json, "\"accelerating\"");
    }

    #[test]
    fn test_candidate_metadata_defaults_when_missing() {
        let json = r#"{"id":"c1","topic_cluster":"keto","angle":"myth","score":0.5}"#;
        let candidate: ContentCandidate = serde_json::from_str(json).unwrap();
        assert!(candidate.metadata.is_empty());
        assert_eq!(candidate.topic_cluster, "keto");
    }

    #[test]
    fn test_record_builder_sets_dimensions() {
        let record = ContentRecord::new("r1", Utc::now())
            .with_topic("sleep")
            .with_angle("science")
            .with_generator("coach")
            .with_format("listicle")
            .with_visual("plain");

        assert_eq!(record.topic_cluster.as_deref(), Some("sleep"));
        assert_eq!(record.angle.as_deref(), Some("science"));
        assert_eq!(record.generator.as_deref(), Some("coach"));
        assert_eq!(record.format_strategy.as_deref(), Some("listicle"));
        assert_eq!(record.visual_format.as_deref(), Some("plain"));
    }
}
