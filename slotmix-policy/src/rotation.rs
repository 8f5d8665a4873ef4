//! Rotation enforcement over concrete candidates
//!
//! Two passes over a candidate batch, both against the same
//! [`DistributionSnapshot`]:
//!
//! 1. [`RotationEnforcer::apply_rotation_weights`] softly down-weights
//!    candidates whose topic or angle is close to its share cap. Nothing is
//!    dropped.
//! 2. [`RotationEnforcer::enforce_rotation`] hard-filters candidates whose
//!    publication would push a share over its cap. If that empties the batch,
//!    the best original candidate survives alone.
//!
//! The snapshot is not updated as candidates are accepted, so two candidates
//! from the same topic can both pass even if publishing both would cross the
//! cap. Callers that publish more than one candidate per pass should rebuild
//! the snapshot in between.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};
use crate::snapshot::DistributionSnapshot;
use crate::types::{ContentCandidate, MAX_WINDOW_DAYS};

/// Metadata key for the combined rotation multiplier
pub const META_ROTATION_MULTIPLIER: &str = "rotation_multiplier";
/// Metadata key for topic share / topic cap
pub const META_TOPIC_SATURATION: &str = "topic_saturation";
/// Metadata key for angle share / angle cap
pub const META_ANGLE_SATURATION: &str = "angle_saturation";

/// Share caps for the rotation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConstraints {
    /// Largest share any one topic may hold, in (0, 1] (default: 0.35)
    pub max_share_per_topic: f64,
    /// Largest share any one angle may hold, in (0, 1] (default: 0.40)
    pub max_share_per_angle: f64,
    /// Length of the rotation window in days (default: 7)
    pub window_days: u32,
}

impl Default for RotationConstraints {
    fn default() -> Self {
        Self {
            max_share_per_topic: 0.35,
            max_share_per_angle: 0.40,
            window_days: 7,
        }
    }
}

impl RotationConstraints {
    /// Check every field is within its allowed range
    pub fn validate(&self) -> Result<()> {
        check_share("max_share_per_topic", self.max_share_per_topic)?;
        check_share("max_share_per_angle", self.max_share_per_angle)?;
        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            return Err(PolicyError::InvalidConstraint(format!(
                "window_days must be in 1..={MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }
        Ok(())
    }

    /// Copy of these constraints with the update's fields applied
    #[must_use]
    pub fn merged(&self, update: &RotationConstraintsUpdate) -> Self {
        Self {
            max_share_per_topic: update
                .max_share_per_topic
                .unwrap_or(self.max_share_per_topic),
            max_share_per_angle: update
                .max_share_per_angle
                .unwrap_or(self.max_share_per_angle),
            window_days: update.window_days.unwrap_or(self.window_days),
        }
    }
}

fn check_share(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PolicyError::InvalidConstraint(format!(
            "{field} must be in (0, 1], got {value}"
        )))
    }
}

/// Partial constraint update; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationConstraintsUpdate {
    pub max_share_per_topic: Option<f64>,
    pub max_share_per_angle: Option<f64>,
    pub window_days: Option<u32>,
}

impl RotationConstraintsUpdate {
    #[must_use]
    pub fn topic(mut self, max_share: f64) -> Self {
        self.max_share_per_topic = Some(max_share);
        self
    }

    #[must_use]
    pub fn angle(mut self, max_share: f64) -> Self {
        self.max_share_per_angle = Some(max_share);
        self
    }

    #[must_use]
    pub fn window_days(mut self, days: u32) -> Self {
        self.window_days = Some(days);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.max_share_per_topic.is_none()
            && self.max_share_per_angle.is_none()
            && self.window_days.is_none()
    }
}

/// Saturation cut-offs and the penalties they trigger
///
/// Saturation is a dimension's current share divided by its cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationThresholds {
    /// Saturation above which the heavy penalty applies (default: 0.8)
    pub heavy_saturation: f64,
    /// Score multiplier for heavily saturated dimensions (default: 0.3)
    pub heavy_multiplier: f64,
    /// Saturation above which the moderate penalty applies (default: 0.6)
    pub moderate_saturation: f64,
    /// Score multiplier for moderately saturated dimensions (default: 0.6)
    pub moderate_multiplier: f64,
    /// Saturation that turns status to warning (default: 0.8)
    pub warning_saturation: f64,
}

impl Default for RotationThresholds {
    fn default() -> Self {
        Self {
            heavy_saturation: 0.8,
            heavy_multiplier: 0.3,
            moderate_saturation: 0.6,
            moderate_multiplier: 0.6,
            warning_saturation: 0.8,
        }
    }
}

impl RotationThresholds {
    /// Score multiplier for one dimension at the given saturation
    pub fn penalty(&self, saturation: f64) -> f64 {
        if saturation > self.heavy_saturation {
            self.heavy_multiplier
        } else if saturation > self.moderate_saturation {
            self.moderate_multiplier
        } else {
            1.0
        }
    }
}

/// Overall rotation health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationHealth {
    Healthy,
    /// Some dimension is close to its cap
    Warning,
    /// Some dimension is over its cap
    Critical,
}

impl RotationHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RotationHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current constraints, the snapshot they were judged against, and the verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationStatus {
    pub constraints: RotationConstraints,
    pub snapshot: DistributionSnapshot,
    pub health: RotationHealth,
}

/// Result of the hard rotation filter
#[derive(Debug, Clone, PartialEq)]
pub struct RotationEnforcement {
    /// Candidates that may be published, in input order
    pub kept: Vec<ContentCandidate>,
    /// Ids of candidates that were filtered out
    pub rejected: Vec<String>,
    /// True when every candidate violated and the top scorer was kept anyway
    pub fallback_used: bool,
}

/// Applies share caps to candidate batches
#[derive(Debug)]
pub struct RotationEnforcer {
    constraints: RwLock<Arc<RotationConstraints>>,
    thresholds: RotationThresholds,
}

impl Default for RotationEnforcer {
    fn default() -> Self {
        Self::new(RotationConstraints::default(), RotationThresholds::default())
    }
}

impl RotationEnforcer {
    pub fn new(constraints: RotationConstraints, thresholds: RotationThresholds) -> Self {
        Self {
            constraints: RwLock::new(Arc::new(constraints)),
            thresholds,
        }
    }

    /// Current constraints; a consistent copy even while an update races
    pub fn constraints(&self) -> Arc<RotationConstraints> {
        self.constraints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn thresholds(&self) -> &RotationThresholds {
        &self.thresholds
    }

    /// Merge a partial update into the constraints and swap them in whole
    ///
    /// Concurrent updates race with last-write-wins. An invalid result is
    /// rejected and the previous constraints stay in place.
    pub fn update_constraints(
        &self,
        update: &RotationConstraintsUpdate,
    ) -> Result<Arc<RotationConstraints>> {
        let mut guard = self
            .constraints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = guard.merged(update);
        next.validate()?;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }

    /// Would publishing this candidate push its topic or angle over the cap?
    pub fn would_violate(&self, candidate: &ContentCandidate, snapshot: &DistributionSnapshot) -> bool {
        projected_violation(candidate, snapshot, &self.constraints())
    }

    /// Down-weight saturated candidates and sort by the rescaled score
    pub fn apply_rotation_weights(
        &self,
        candidates: Vec<ContentCandidate>,
        snapshot: &DistributionSnapshot,
    ) -> Vec<ContentCandidate> {
        let constraints = self.constraints();

        let mut weighted: Vec<ContentCandidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                let topic_saturation = saturation(
                    snapshot.topic_share(&candidate.topic_cluster),
                    constraints.max_share_per_topic,
                );
                let angle_saturation = saturation(
                    snapshot.angle_share(&candidate.angle),
                    constraints.max_share_per_angle,
                );
                let multiplier = self.thresholds.penalty(topic_saturation)
                    * self.thresholds.penalty(angle_saturation);

                candidate.score *= multiplier;
                candidate
                    .metadata
                    .insert(META_ROTATION_MULTIPLIER.into(), multiplier.into());
                candidate
                    .metadata
                    .insert(META_TOPIC_SATURATION.into(), topic_saturation.into());
                candidate
                    .metadata
                    .insert(META_ANGLE_SATURATION.into(), angle_saturation.into());
                candidate
            })
            .collect();

        weighted.sort_by(|a, b| b.score.total_cmp(&a.score));
        weighted
    }

    /// Drop candidates that would violate a cap, never returning an empty batch
    pub fn enforce_rotation(
        &self,
        candidates: Vec<ContentCandidate>,
        snapshot: &DistributionSnapshot,
    ) -> RotationEnforcement {
        let constraints = self.constraints();

        let (kept, violating): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !projected_violation(c, snapshot, &constraints));

        if !kept.is_empty() || violating.is_empty() {
            return RotationEnforcement {
                kept,
                rejected: violating.into_iter().map(|c| c.id).collect(),
                fallback_used: false,
            };
        }

        let best_index = violating
            .iter()
            .enumerate()
            .fold(0, |best, (i, c)| {
                if c.score > violating[best].score { i } else { best }
            });

        let mut rejected = Vec::with_capacity(violating.len() - 1);
        let mut kept = Vec::with_capacity(1);
        for (i, candidate) in violating.into_iter().enumerate() {
            if i == best_index {
                kept.push(candidate);
            } else {
                rejected.push(candidate.id);
            }
        }

        RotationEnforcement {
            kept,
            rejected,
            fallback_used: true,
        }
    }

    /// Judge the snapshot against the current constraints
    pub fn status(&self, snapshot: DistributionSnapshot) -> RotationStatus {
        let constraints = self.constraints();

        let health = if snapshot.has_violations() {
            RotationHealth::Critical
        } else if self.near_cap(&snapshot, &constraints) {
            RotationHealth::Warning
        } else {
            RotationHealth::Healthy
        };

        RotationStatus {
            constraints: (*constraints).clone(),
            snapshot,
            health,
        }
    }

    fn near_cap(&self, snapshot: &DistributionSnapshot, constraints: &RotationConstraints) -> bool {
        let warning = self.thresholds.warning_saturation;
        let topic = snapshot
            .topic_distribution
            .values()
            .any(|s| saturation(*s, constraints.max_share_per_topic) > warning);
        let angle = snapshot
            .angle_distribution
            .values()
            .any(|s| saturation(*s, constraints.max_share_per_angle) > warning);
        topic || angle
    }
}

fn saturation(share: f64, max_share: f64) -> f64 {
    if max_share > 0.0 { share / max_share } else { 0.0 }
}

fn projected_violation(
    candidate: &ContentCandidate,
    snapshot: &DistributionSnapshot,
    constraints: &RotationConstraints,
) -> bool {
    // No history yet; nothing can be saturated
    if snapshot.is_empty() {
        return false;
    }

    let total = snapshot.total_count as f64;
    let project = |share: f64| (share * total + 1.0) / (total + 1.0);

    project(snapshot.topic_share(&candidate.topic_cluster)) > constraints.max_share_per_topic
        || project(snapshot.angle_share(&candidate.angle)) > constraints.max_share_per_angle
}
