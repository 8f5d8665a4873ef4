//! Structured policy events and where they go
//!
//! Decision components return plain data. The orchestrator turns what
//! happened during a selection cycle into [`PolicyEvent`]s and hands them to
//! an injected [`PolicyEventSink`], so callers choose whether events become
//! log lines, a live feed, or nothing at all.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::orchestrator::SelectionMode;
use crate::rotation::{RotationConstraints, RotationHealth};
use crate::types::GrowthTrend;

/// Which external collaborator an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    RecordSource,
    PerformanceSource,
    GrowthEvaluator,
    SettlingEvaluator,
    CandidateGenerator,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordSource => "record_source",
            Self::PerformanceSource => "performance_source",
            Self::GrowthEvaluator => "growth_evaluator",
            Self::SettlingEvaluator => "settling_evaluator",
            Self::CandidateGenerator => "candidate_generator",
        }
    }
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the policy decided or worked around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEvent {
    ExplorationDecided {
        trend: GrowthTrend,
        settling: bool,
        rate: f64,
        reasoning: String,
    },
    WeightsBlended {
        adjusted_slots: usize,
        degenerate: bool,
        /// Blended weights failed validation and the priors were used instead
        used_priors: bool,
    },
    SlotChosen {
        slot: String,
        mode: SelectionMode,
        weight: f64,
    },
    RotationApplied {
        candidates: usize,
        kept: usize,
        rejected: Vec<String>,
        violations: Vec<String>,
    },
    RotationFallback {
        kept_id: String,
        rejected: usize,
    },
    CollaboratorFailed {
        collaborator: Collaborator,
        error: String,
    },
    ConstraintsUpdated {
        constraints: RotationConstraints,
    },
    RotationChecked {
        health: RotationHealth,
        violations: Vec<String>,
    },
    DiversityChecked {
        healthy: bool,
        issues: Vec<String>,
        fixes: Vec<String>,
    },
}

impl PolicyEvent {
    /// Short name matching the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExplorationDecided { .. } => "exploration_decided",
            Self::WeightsBlended { .. } => "weights_blended",
            Self::SlotChosen { .. } => "slot_chosen",
            Self::RotationApplied { .. } => "rotation_applied",
            Self::RotationFallback { .. } => "rotation_fallback",
            Self::CollaboratorFailed { .. } => "collaborator_failed",
            Self::ConstraintsUpdated { .. } => "constraints_updated",
            Self::RotationChecked { .. } => "rotation_checked",
            Self::DiversityChecked { .. } => "diversity_checked",
        }
    }
}

/// Receives policy events
pub trait PolicyEventSink: Send + Sync {
    fn emit(&self, event: &PolicyEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventSink;

impl PolicyEventSink for NoOpEventSink {
    fn emit(&self, _event: &PolicyEvent) {}
}

/// Writes events as structured `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl PolicyEventSink for TracingEventSink {
    fn emit(&self, event: &PolicyEvent) {
        match event {
            PolicyEvent::ExplorationDecided {
                trend,
                settling,
                rate,
                reasoning,
            } => debug!(%trend, settling, rate, reasoning = %reasoning, "Exploration rate decided"),
            PolicyEvent::WeightsBlended {
                adjusted_slots,
                degenerate,
                used_priors,
            } => {
                if *used_priors {
                    warn!(adjusted_slots, degenerate, "Blended weights invalid, using priors");
                } else {
                    debug!(adjusted_slots, degenerate, "Slot weights blended");
                }
            }
            PolicyEvent::SlotChosen { slot, mode, weight } => {
                info!(slot = %slot, mode = mode.as_str(), weight, "Slot chosen")
            }
            PolicyEvent::RotationApplied {
                candidates,
                kept,
                rejected,
                violations,
            } => debug!(
                candidates,
                kept,
                rejected = rejected.len(),
                violations = ?violations,
                "Rotation applied"
            ),
            PolicyEvent::RotationFallback { kept_id, rejected } => warn!(
                kept_id = %kept_id,
                rejected,
                "Every candidate violated rotation, keeping top scorer"
            ),
            PolicyEvent::CollaboratorFailed {
                collaborator,
                error,
            } => debug!(%collaborator, error = %error, "Collaborator fallback recorded"),
            PolicyEvent::ConstraintsUpdated { constraints } => info!(
                max_share_per_topic = constraints.max_share_per_topic,
                max_share_per_angle = constraints.max_share_per_angle,
                window_days = constraints.window_days,
                "Rotation constraints updated"
            ),
            PolicyEvent::RotationChecked { health, violations } => {
                info!(%health, violations = ?violations, "Rotation status checked")
            }
            PolicyEvent::DiversityChecked {
                healthy,
                issues,
                fixes,
            } => {
                if *healthy {
                    info!("Diversity healthy");
                } else {
                    warn!(issues = ?issues, fixes = ?fixes, "Diversity issues detected");
                }
            }
        }
    }
}

/// Broadcasts events to any number of live subscribers
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<PolicyEvent>,
}

impl BroadcastEventSink {
    /// Default channel capacity for policy events.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PolicyEventSink for BroadcastEventSink {
    fn emit(&self, event: &PolicyEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.tx.send(event.clone());
    }
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Debug-level subscriber that writes through the test harness
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
