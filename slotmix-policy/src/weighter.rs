//! Prior/performance weight blending
//!
//! Merges the fixed strategic prior for each slot with its observed
//! performance. Learning can only nudge a prior within a bounded band, and
//! slots without enough data keep their prior untouched, so a handful of
//! noisy posts cannot swing the distribution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{CategoryWeights, PerformanceSummary};

/// Allowed distance of a weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Score that counts as neither good nor bad
const NEUTRAL_SCORE: f64 = 0.5;

/// Configuration for the slot weighter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeighterConfig {
    /// Posts a slot needs before its performance is trusted (default: 10)
    pub min_posts_for_adjustment: u32,
    /// How far performance may move a weight, 0..1 (default: 0.3)
    pub learning_strength: f64,
    /// Lower clamp as a multiple of the prior (default: 0.25)
    pub min_multiplier: f64,
    /// Upper clamp as a multiple of the prior (default: 2.0)
    pub max_multiplier: f64,
}

impl Default for WeighterConfig {
    fn default() -> Self {
        Self {
            min_posts_for_adjustment: 10,
            learning_strength: 0.3,
            min_multiplier: 0.25,
            max_multiplier: 2.0,
        }
    }
}

/// Why a slot ended up with its pre-normalization weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Performance data moved the weight
    Adjusted,
    /// Too few samples or no primary score; prior kept
    InsufficientData,
    /// Prior is zero; slot is never touched
    ZeroPrior,
}

/// Audit record for one slot in a blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAdjustment {
    pub slot: String,
    pub base_weight: f64,
    /// Weight after learning and clamping, before renormalization
    pub adjusted_weight: f64,
    /// Signed score in -1..1, when performance was used
    pub normalized_score: Option<f64>,
    pub reason: AdjustmentReason,
}

/// Result of blending priors with performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightBlend {
    pub weights: CategoryWeights,
    pub adjustments: Vec<SlotAdjustment>,
    /// True when every adjusted weight was zero and the priors were returned as-is
    pub degenerate: bool,
}

impl WeightBlend {
    /// Number of slots whose weight was moved by performance data
    pub fn adjusted_count(&self) -> usize {
        self.adjustments
            .iter()
            .filter(|a| a.reason == AdjustmentReason::Adjusted)
            .count()
    }
}

/// Blends prior slot weights with performance summaries
#[derive(Debug, Clone, Default)]
pub struct SlotPolicyWeighter {
    config: WeighterConfig,
}

impl SlotPolicyWeighter {
    /// Create a new weighter with the given configuration
    pub fn new(config: WeighterConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &WeighterConfig {
        &self.config
    }

    /// Blend priors with performance, returning the normalized weights only
    pub fn compute_weights(
        &self,
        base_weights: &CategoryWeights,
        performance_by_slot: &HashMap<String, PerformanceSummary>,
    ) -> CategoryWeights {
        self.blend(base_weights, performance_by_slot).weights
    }

    /// Blend priors with performance, keeping the per-slot audit trail
    pub fn blend(
        &self,
        base_weights: &CategoryWeights,
        performance_by_slot: &HashMap<String, PerformanceSummary>,
    ) -> WeightBlend {
        let strength = self.config.learning_strength.clamp(0.0, 1.0);
        let mut adjusted = CategoryWeights::new();
        let mut adjustments = Vec::with_capacity(base_weights.len());

        for (slot, &base_weight) in base_weights {
            // Zero, negative and non-finite priors are all "never selectable"
            if !(base_weight > 0.0 && base_weight.is_finite()) {
                adjusted.insert(slot.clone(), 0.0);
                adjustments.push(SlotAdjustment {
                    slot: slot.clone(),
                    base_weight,
                    adjusted_weight: 0.0,
                    normalized_score: None,
                    reason: AdjustmentReason::ZeroPrior,
                });
                continue;
            }

            let score = performance_by_slot
                .get(slot)
                .filter(|p| p.sample_count >= self.config.min_posts_for_adjustment)
                .and_then(|p| p.avg_primary_score)
                .filter(|s| s.is_finite());

            let adjustment = match score {
                Some(score) => {
                    let normalized = (score - NEUTRAL_SCORE) * 2.0;
                    let raw = base_weight * (1.0 + strength * normalized);
                    let weight = raw.clamp(
                        base_weight * self.config.min_multiplier,
                        base_weight * self.config.max_multiplier,
                    );
                    SlotAdjustment {
                        slot: slot.clone(),
                        base_weight,
                        adjusted_weight: weight,
                        normalized_score: Some(normalized),
                        reason: AdjustmentReason::Adjusted,
                    }
                }
                None => SlotAdjustment {
                    slot: slot.clone(),
                    base_weight,
                    adjusted_weight: base_weight,
                    normalized_score: None,
                    reason: AdjustmentReason::InsufficientData,
                },
            };

            adjusted.insert(slot.clone(), adjustment.adjusted_weight);
            adjustments.push(adjustment);
        }

        let total: f64 = adjusted.values().sum();
        if total == 0.0 {
            return WeightBlend {
                weights: base_weights.clone(),
                adjustments,
                degenerate: true,
            };
        }

        let weights = adjusted
            .into_iter()
            .map(|(slot, weight)| (slot, weight / total))
            .collect();

        WeightBlend {
            weights,
            adjustments,
            degenerate: false,
        }
    }
}

/// Blend priors with performance using optional overrides of the defaults
pub fn compute_slot_weights(
    base_weights: &CategoryWeights,
    performance_by_slot: &HashMap<String, PerformanceSummary>,
    min_posts_for_adjustment: Option<u32>,
    learning_strength: Option<f64>,
) -> CategoryWeights {
    let defaults = WeighterConfig::default();
    let config = WeighterConfig {
        min_posts_for_adjustment: min_posts_for_adjustment
            .unwrap_or(defaults.min_posts_for_adjustment),
        learning_strength: learning_strength.unwrap_or(defaults.learning_strength),
        ..defaults
    };
    SlotPolicyWeighter::new(config).compute_weights(base_weights, performance_by_slot)
}

/// True iff every weight is non-negative and the weights sum to 1 ± 0.01
pub fn validate_weights(weights: &CategoryWeights) -> bool {
    if weights.values().any(|w| !(w.is_finite() && *w >= 0.0)) {
        return false;
    }
    let sum: f64 = weights.values().sum();
    (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::config::default_priors;

    fn assert_weights_close(left: &CategoryWeights, right: &CategoryWeights) {
        assert_eq!(left.len(), right.len());
        for (slot, weight) in left {
            assert!((weight - right[slot]).abs() < 1e-9, "{slot}: {weight} vs {}", right[slot]);
        }
    }

    fn perf(slot: &str, score: f64, count: u32) -> HashMap<String, PerformanceSummary> {
        let mut map = HashMap::new();
        map.insert(
            slot.to_string(),
            PerformanceSummary::new(slot, Some(score), count),
        );
        map
    }

    #[test]
    fn test_framework_scenario() {
        let weighter = SlotPolicyWeighter::default();
        let blend = weighter.blend(&default_priors(), &perf("framework", 0.9, 20));

        let framework = blend
            .adjustments
            .iter()
            .find(|a| a.slot == "framework")
            .unwrap();
        assert_eq!(framework.reason, AdjustmentReason::Adjusted);
        assert!((framework.normalized_score.unwrap() - 0.8).abs() < 1e-9);
        assert!((framework.adjusted_weight - 0.186).abs() < 1e-9);

        // 0.186 against the 0.85 of untouched priors
        let expected = 0.186 / 1.036;
        assert!((blend.weights["framework"] - expected).abs() < 1e-9);
        assert!((blend.weights["story"] - 0.10 / 1.036).abs() < 1e-9);
        assert!(validate_weights(&blend.weights));
    }

    #[test]
    fn test_insufficient_samples_keep_prior() {
        let weighter = SlotPolicyWeighter::default();
        let weights = weighter.compute_weights(&default_priors(), &perf("framework", 1.0, 9));
        assert_weights_close(&weights, &default_priors());
    }

    #[test]
    fn test_missing_primary_score_keeps_prior() {
        let weighter = SlotPolicyWeighter::default();
        let mut performance = HashMap::new();
        performance.insert(
            "framework".to_string(),
            PerformanceSummary::new("framework", None, 50).with_secondary(0.9),
        );
        let blend = weighter.blend(&default_priors(), &performance);
        assert_eq!(blend.adjusted_count(), 0);
        assert_weights_close(&blend.weights, &default_priors());
    }

    #[test]
    fn test_zero_prior_stays_zero() {
        let mut priors = default_priors();
        priors.insert("retired".to_string(), 0.0);
        let weights = compute_slot_weights(&priors, &perf("retired", 1.0, 500), None, Some(1.0));
        assert_eq!(weights["retired"], 0.0);
    }

    #[test]
    fn test_adjustment_clamped_to_band() {
        let weighter = SlotPolicyWeighter::new(WeighterConfig {
            learning_strength: 1.0,
            max_multiplier: 1.5,
            min_multiplier: 0.75,
            ..Default::default()
        });

        let blend = weighter.blend(&default_priors(), &perf("story", 1.0, 30));
        let story = blend.adjustments.iter().find(|a| a.slot == "story").unwrap();
        assert!((story.adjusted_weight - 0.15).abs() < 1e-9);

        let blend = weighter.blend(&default_priors(), &perf("story", 0.0, 30));
        let story = blend.adjustments.iter().find(|a| a.slot == "story").unwrap();
        assert!((story.adjusted_weight - 0.075).abs() < 1e-9);
    }

    #[test]
    fn test_learning_strength_is_clamped() {
        let strong = compute_slot_weights(&default_priors(), &perf("story", 0.75, 20), None, Some(7.0));
        let capped = compute_slot_weights(&default_priors(), &perf("story", 0.75, 20), None, Some(1.0));
        assert_eq!(strong, capped);
    }

    #[test]
    fn test_all_zero_priors_returned_unmodified() {
        let priors: CategoryWeights = [("a".to_string(), 0.0), ("b".to_string(), 0.0)]
            .into_iter()
            .collect();
        let blend = SlotPolicyWeighter::default().blend(&priors, &HashMap::new());
        assert!(blend.degenerate);
        assert_eq!(blend.weights, priors);
    }

    #[test]
    fn test_blend_is_deterministic() {
        let weighter = SlotPolicyWeighter::default();
        let performance = perf("contrarian", 0.3, 40);
        let first = weighter.compute_weights(&default_priors(), &performance);
        let second = weighter.compute_weights(&default_priors(), &performance);
        assert_eq!(first, second);
    }

    #[test]
    fn test_random_inputs_sum_to_one_within_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let weighter = SlotPolicyWeighter::default();

        for _ in 0..200 {
            let slots = rng.gen_range(1..8);
            let mut priors = CategoryWeights::new();
            let mut performance = HashMap::new();
            for i in 0..slots {
                let slot = format!("slot_{i}");
                let weight = if rng.gen_bool(0.15) { 0.0 } else { rng.gen_range(0.01..1.0) };
                priors.insert(slot.clone(), weight);
                let score = if rng.gen_bool(0.2) { None } else { Some(rng.gen_range(0.0..=1.0)) };
                performance.insert(
                    slot.clone(),
                    PerformanceSummary::new(slot, score, rng.gen_range(0..40)),
                );
            }
            let total: f64 = priors.values().sum();
            if total == 0.0 {
                continue;
            }
            for w in priors.values_mut() {
                *w /= total;
            }

            let blend = weighter.blend(&priors, &performance);
            assert!(validate_weights(&blend.weights), "{:?}", blend.weights);
            for adj in &blend.adjustments {
                assert!(adj.adjusted_weight >= adj.base_weight * 0.25 - 1e-12);
                assert!(adj.adjusted_weight <= adj.base_weight * 2.0 + 1e-12);
                if adj.base_weight == 0.0 {
                    assert_eq!(blend.weights[&adj.slot], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_validate_weights() {
        assert!(validate_weights(&default_priors()));

        let mut off = default_priors();
        off.insert("extra".to_string(), 0.02);
        assert!(!validate_weights(&off));

        let mut within = default_priors();
        within.insert("extra".to_string(), 0.009);
        assert!(validate_weights(&within));

        let negative: CategoryWeights = [("a".to_string(), 1.2), ("b".to_string(), -0.2)]
            .into_iter()
            .collect();
        assert!(!validate_weights(&negative));

        assert!(!validate_weights(&CategoryWeights::new()));
    }

    #[test]
    fn test_config_defaults() {
        let config = WeighterConfig::default();
        assert_eq!(config.min_posts_for_adjustment, 10);
        assert!((config.learning_strength - 0.3).abs() < f64::EPSILON);
        assert!((config.min_multiplier - 0.25).abs() < f64::EPSILON);
        assert!((config.max_multiplier - 2.0).abs() < f64::EPSILON);
    }
}
