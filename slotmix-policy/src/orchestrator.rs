//! Selection cycle orchestration
//!
//! [`PolicyOrchestrator`] wires the pure decision components to the external
//! collaborators. A selection cycle runs:
//!
//! 1. growth trend and settling → exploration rate
//! 2. performance summaries → blended slot weights (priors if invalid)
//! 3. explore (uniform over slots with a positive prior) or exploit
//!    (proportional to blended weights)
//! 4. candidates for the chosen slot
//! 5. recent records → snapshot → rotation weighting → rotation enforcement
//! 6. top `limit` survivors
//!
//! Collaborator failures never abort a cycle. Each one is logged, recorded
//! as a [`PolicyEvent::CollaboratorFailed`], and replaced with a default.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    CandidateGenerator, FixedGrowthSignals, GrowthEvaluator, InMemoryRecordSource,
    PerformanceSource, RecordSource, SettlingEvaluator, StaticCandidateGenerator,
    StaticPerformanceSource,
};
use crate::config::PolicyConfig;
use crate::diversity::{DiversityHealth, DiversityMonitor};
use crate::error::Result;
use crate::exploration::ExplorationController;
use crate::observe::{Collaborator, PolicyEvent, PolicyEventSink, TracingEventSink};
use crate::rotation::{RotationConstraints, RotationConstraintsUpdate, RotationEnforcer, RotationStatus};
use crate::snapshot::{DistributionSnapshot, DistributionSnapshotBuilder};
use crate::types::{CategoryWeights, ContentCandidate, ExplorationDecision, GrowthTrend};
use crate::weighter::{SlotPolicyWeighter, validate_weights};

/// How the slot for a cycle was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Sampled proportionally to the blended weights
    Exploit,
    /// Sampled uniformly over slots with a positive prior
    Explore,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploit => "exploit",
            Self::Explore => "explore",
        }
    }
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slot a cycle settled on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotChoice {
    pub slot: String,
    pub mode: SelectionMode,
    /// Weight the slot carried in the distribution it was drawn from
    pub weight: f64,
}

/// Everything one selection cycle decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selection_id: Uuid,
    /// `None` only when no slot has a positive prior
    pub choice: Option<SlotChoice>,
    pub exploration: ExplorationDecision,
    /// Weights the exploit draw used
    pub weights: CategoryWeights,
    /// Surviving candidates, best first, at most `limit` (minimum 1)
    pub candidates: Vec<ContentCandidate>,
    /// Ids removed by rotation enforcement
    pub rejected: Vec<String>,
    pub snapshot: DistributionSnapshot,
    pub fallback_used: bool,
    pub events: Vec<PolicyEvent>,
    pub decided_at: DateTime<Utc>,
}

impl SelectionOutcome {
    pub fn slot(&self) -> Option<&str> {
        self.choice.as_ref().map(|c| c.slot.as_str())
    }

    pub fn mode(&self) -> Option<SelectionMode> {
        self.choice.as_ref().map(|c| c.mode)
    }

    /// Number of collaborator calls that fell back to a default
    pub fn fallbacks(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PolicyEvent::CollaboratorFailed { .. }))
            .count()
    }
}

/// Builder for [`PolicyOrchestrator`]
///
/// Collaborators left unset get an empty in-memory implementation.
pub struct PolicyOrchestratorBuilder {
    config: PolicyConfig,
    records: Option<Arc<dyn RecordSource>>,
    performance: Option<Arc<dyn PerformanceSource>>,
    growth: Option<Arc<dyn GrowthEvaluator>>,
    settling: Option<Arc<dyn SettlingEvaluator>>,
    generator: Option<Arc<dyn CandidateGenerator>>,
    sink: Option<Arc<dyn PolicyEventSink>>,
}

impl PolicyOrchestratorBuilder {
    pub fn record_source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.records = Some(source);
        self
    }

    pub fn performance_source(mut self, source: Arc<dyn PerformanceSource>) -> Self {
        self.performance = Some(source);
        self
    }

    pub fn growth_evaluator(mut self, evaluator: Arc<dyn GrowthEvaluator>) -> Self {
        self.growth = Some(evaluator);
        self
    }

    pub fn settling_evaluator(mut self, evaluator: Arc<dyn SettlingEvaluator>) -> Self {
        self.settling = Some(evaluator);
        self
    }

    pub fn candidate_generator(mut self, generator: Arc<dyn CandidateGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn PolicyEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and assemble the orchestrator
    pub fn build(self) -> Result<PolicyOrchestrator> {
        let config = self.config;
        config.validate()?;

        let rng = match config.selection.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(PolicyOrchestrator {
            weighter: SlotPolicyWeighter::new(config.weighter),
            exploration: ExplorationController::new(config.exploration),
            enforcer: RotationEnforcer::new(config.rotation, config.rotation_thresholds),
            snapshots: DistributionSnapshotBuilder::new(),
            diversity: DiversityMonitor::new(config.diversity),
            base_weights: config.base_weights,
            max_results: config.selection.max_results,
            performance_window_days: config.selection.performance_window_days,
            records: self
                .records
                .unwrap_or_else(|| Arc::new(InMemoryRecordSource::new())),
            performance: self
                .performance
                .unwrap_or_else(|| Arc::new(StaticPerformanceSource::default())),
            growth: self
                .growth
                .unwrap_or_else(|| Arc::new(FixedGrowthSignals::default())),
            settling: self
                .settling
                .unwrap_or_else(|| Arc::new(FixedGrowthSignals::default())),
            generator: self
                .generator
                .unwrap_or_else(|| Arc::new(StaticCandidateGenerator::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingEventSink)),
            rng: Mutex::new(rng),
        })
    }
}

/// Runs selection cycles against injected collaborators
///
/// One instance is meant to be shared (behind an `Arc`) by every caller;
/// the only mutable state is the rotation constraints and the RNG.
pub struct PolicyOrchestrator {
    weighter: SlotPolicyWeighter,
    exploration: ExplorationController,
    enforcer: RotationEnforcer,
    snapshots: DistributionSnapshotBuilder,
    diversity: DiversityMonitor,
    base_weights: CategoryWeights,
    max_results: usize,
    performance_window_days: u32,
    records: Arc<dyn RecordSource>,
    performance: Arc<dyn PerformanceSource>,
    growth: Arc<dyn GrowthEvaluator>,
    settling: Arc<dyn SettlingEvaluator>,
    generator: Arc<dyn CandidateGenerator>,
    sink: Arc<dyn PolicyEventSink>,
    rng: Mutex<StdRng>,
}

impl PolicyOrchestrator {
    pub fn builder(config: PolicyConfig) -> PolicyOrchestratorBuilder {
        PolicyOrchestratorBuilder {
            config,
            records: None,
            performance: None,
            growth: None,
            settling: None,
            generator: None,
            sink: None,
        }
    }

    pub fn base_weights(&self) -> &CategoryWeights {
        &self.base_weights
    }

    pub fn enforcer(&self) -> &RotationEnforcer {
        &self.enforcer
    }

    /// Configured number of candidates per cycle
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Run a cycle returning the configured number of candidates
    pub async fn select_default(&self) -> SelectionOutcome {
        self.select(self.max_results).await
    }

    /// Run one selection cycle returning at most `limit` candidates
    ///
    /// A `limit` of 0 is treated as 1 so a cycle with survivors never comes
    /// back empty.
    pub async fn select(&self, limit: usize) -> SelectionOutcome {
        let mut events = Vec::new();

        let trend = fail_open(
            self.growth.growth_trend().await,
            Collaborator::GrowthEvaluator,
            &mut events,
            || GrowthTrend::Flat,
        );
        let settling = fail_open(
            self.settling.is_settling().await,
            Collaborator::SettlingEvaluator,
            &mut events,
            || false,
        );
        let exploration = self.exploration.decide(trend, settling);
        events.push(PolicyEvent::ExplorationDecided {
            trend,
            settling,
            rate: exploration.rate,
            reasoning: exploration.reasoning.clone(),
        });

        let performance = fail_open(
            self.performance
                .performance_by_slot(self.performance_window_days)
                .await,
            Collaborator::PerformanceSource,
            &mut events,
            HashMap::new,
        );
        let blend = self.weighter.blend(&self.base_weights, &performance);
        let used_priors = !validate_weights(&blend.weights);
        events.push(PolicyEvent::WeightsBlended {
            adjusted_slots: blend.adjusted_count(),
            degenerate: blend.degenerate,
            used_priors,
        });
        let weights = if used_priors {
            self.base_weights.clone()
        } else {
            blend.weights
        };

        let constraints = self.enforcer.constraints();
        let Some(choice) = self.choose_slot(&weights, exploration.rate) else {
            warn!("No slot has a positive prior, nothing to select");
            return self.finish(
                None,
                exploration,
                weights,
                RotationOutcome::empty(constraints.window_days),
                events,
            );
        };
        events.push(PolicyEvent::SlotChosen {
            slot: choice.slot.clone(),
            mode: choice.mode,
            weight: choice.weight,
        });

        let candidates = fail_open(
            self.generator.candidates(&choice.slot).await,
            Collaborator::CandidateGenerator,
            &mut events,
            Vec::new,
        );
        let records = fail_open(
            self.records.recent_records(constraints.window_days).await,
            Collaborator::RecordSource,
            &mut events,
            Vec::new,
        );
        let snapshot = self
            .snapshots
            .build(&records, constraints.window_days, &constraints);

        let candidate_count = candidates.len();
        let weighted = self.enforcer.apply_rotation_weights(candidates, &snapshot);
        let mut enforcement = self.enforcer.enforce_rotation(weighted, &snapshot);

        events.push(PolicyEvent::RotationApplied {
            candidates: candidate_count,
            kept: enforcement.kept.len(),
            rejected: enforcement.rejected.clone(),
            violations: snapshot.violations.clone(),
        });
        if enforcement.fallback_used
            && let Some(kept) = enforcement.kept.first()
        {
            events.push(PolicyEvent::RotationFallback {
                kept_id: kept.id.clone(),
                rejected: enforcement.rejected.len(),
            });
        }

        enforcement.kept.truncate(limit.max(1));
        let rotation = RotationOutcome {
            candidates: enforcement.kept,
            rejected: enforcement.rejected,
            snapshot,
            fallback_used: enforcement.fallback_used,
        };
        self.finish(Some(choice), exploration, weights, rotation, events)
    }

    /// Current rotation constraints judged against recent records
    pub async fn rotation_status(&self) -> RotationStatus {
        let mut events = Vec::new();
        let constraints = self.enforcer.constraints();

        let records = fail_open(
            self.records.recent_records(constraints.window_days).await,
            Collaborator::RecordSource,
            &mut events,
            Vec::new,
        );
        let snapshot = self
            .snapshots
            .build(&records, constraints.window_days, &constraints);
        let status = self.enforcer.status(snapshot);

        events.push(PolicyEvent::RotationChecked {
            health: status.health,
            violations: status.snapshot.violations.clone(),
        });
        self.emit_all(&events);
        status
    }

    /// Apply a partial constraint update; the next cycle sees the new values
    pub fn update_rotation_constraints(
        &self,
        update: &RotationConstraintsUpdate,
    ) -> Result<Arc<RotationConstraints>> {
        match self.enforcer.update_constraints(update) {
            Ok(constraints) => {
                self.sink.emit(&PolicyEvent::ConstraintsUpdated {
                    constraints: (*constraints).clone(),
                });
                Ok(constraints)
            }
            Err(e) => {
                warn!(error = %e, "Rejected rotation constraint update");
                Err(e)
            }
        }
    }

    /// Advisory diversity check over recent records
    pub async fn diversity_health(&self) -> DiversityHealth {
        let mut events = Vec::new();

        let records = fail_open(
            self.records
                .recent_records(self.diversity.config().lookback_days)
                .await,
            Collaborator::RecordSource,
            &mut events,
            Vec::new,
        );
        let health = self.diversity.check_health(&records);

        events.push(PolicyEvent::DiversityChecked {
            healthy: health.healthy,
            issues: health.issues.clone(),
            fixes: health.fixes.clone(),
        });
        self.emit_all(&events);
        health
    }

    fn choose_slot(&self, weights: &CategoryWeights, exploration_rate: f64) -> Option<SlotChoice> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        if rng.r#gen::<f64>() < exploration_rate {
            let open: Vec<&String> = self
                .base_weights
                .iter()
                .filter(|(_, weight)| **weight > 0.0)
                .map(|(slot, _)| slot)
                .collect();
            if open.is_empty() {
                return None;
            }
            let slot = open[rng.gen_range(0..open.len())];
            return Some(SlotChoice {
                slot: slot.clone(),
                mode: SelectionMode::Explore,
                weight: 1.0 / open.len() as f64,
            });
        }

        sample_weighted(&mut *rng, weights).map(|(slot, weight)| SlotChoice {
            slot: slot.clone(),
            mode: SelectionMode::Exploit,
            weight,
        })
    }

    fn finish(
        &self,
        choice: Option<SlotChoice>,
        exploration: ExplorationDecision,
        weights: CategoryWeights,
        rotation: RotationOutcome,
        events: Vec<PolicyEvent>,
    ) -> SelectionOutcome {
        self.emit_all(&events);

        let outcome = SelectionOutcome {
            selection_id: Uuid::now_v7(),
            choice,
            exploration,
            weights,
            candidates: rotation.candidates,
            rejected: rotation.rejected,
            snapshot: rotation.snapshot,
            fallback_used: rotation.fallback_used,
            events,
            decided_at: Utc::now(),
        };

        info!(
            selection_id = %outcome.selection_id,
            slot = outcome.slot().unwrap_or("none"),
            candidates = outcome.candidates.len(),
            fallbacks = outcome.fallbacks(),
            "Selection cycle complete"
        );
        outcome
    }

    fn emit_all(&self, events: &[PolicyEvent]) {
        for event in events {
            self.sink.emit(event);
        }
    }
}

/// Rotation stage results carried into the outcome
struct RotationOutcome {
    candidates: Vec<ContentCandidate>,
    rejected: Vec<String>,
    snapshot: DistributionSnapshot,
    fallback_used: bool,
}

impl RotationOutcome {
    fn empty(window_days: u32) -> Self {
        Self {
            candidates: Vec::new(),
            rejected: Vec::new(),
            snapshot: DistributionSnapshot::empty(window_days),
            fallback_used: false,
        }
    }
}

/// Unwrap a collaborator result, substituting `fallback` on error
fn fail_open<T>(
    result: Result<T>,
    collaborator: Collaborator,
    events: &mut Vec<PolicyEvent>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(%collaborator, error = %e, "Collaborator failed, using default");
            events.push(PolicyEvent::CollaboratorFailed {
                collaborator,
                error: e.to_string(),
            });
            fallback()
        }
    }
}

/// Draw a slot with probability proportional to its weight
fn sample_weighted<'a, R: Rng + ?Sized>(
    rng: &mut R,
    weights: &'a CategoryWeights,
) -> Option<(&'a String, f64)> {
    let usable = || {
        weights
            .iter()
            .filter(|(_, weight)| weight.is_finite() && **weight > 0.0)
    };

    let total: f64 = usable().map(|(_, weight)| *weight).sum();
    if total <= 0.0 {
        return None;
    }

    let mut target = rng.r#gen::<f64>() * total;
    let mut last = None;
    for (slot, &weight) in usable() {
        if target < weight {
            debug!(slot = %slot, weight, "Weighted draw");
            return Some((slot, weight));
        }
        target -= weight;
        last = Some((slot, weight));
    }
    // Float residue past the final bucket
    last
}
