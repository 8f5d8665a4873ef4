//! slotmix-policy - Adaptive content-slot selection
//!
//! Decides which content slot to produce next and which candidates to keep.
//! Strategic priors are blended with observed performance, an exploration
//! floor keeps every slot in play, and a rotation layer stops any single
//! topic or angle from dominating recent output. A separate advisory check
//! reports diversity problems without influencing selection.
//!
//! The decision components (weighter, exploration controller, snapshot
//! builder, rotation enforcer, diversity monitor) are synchronous and pure.
//! [`PolicyOrchestrator`] connects them to async collaborators and fails
//! open when any collaborator is unavailable.

pub mod collaborators;
pub mod config;
pub mod diversity;
pub mod error;
pub mod exploration;
pub mod observe;
pub mod orchestrator;
pub mod performance;
pub mod rotation;
pub mod snapshot;
pub mod types;
pub mod weighter;

pub use config::{PolicyConfig, SelectionConfig, default_priors};
pub use error::{PolicyError, Result};
pub use types::*;

// Decision components
pub use diversity::{DiversityConfig, DiversityHealth, DiversityMonitor, check_diversity_health};
pub use exploration::{
    ExplorationConfig, ExplorationController, MIN_EXPLORATION_RATE, compute_exploration_rate,
};
pub use rotation::{
    RotationConstraints, RotationConstraintsUpdate, RotationEnforcement, RotationEnforcer,
    RotationHealth, RotationStatus, RotationThresholds,
};
pub use snapshot::{DistributionSnapshot, DistributionSnapshotBuilder, build_snapshot};
pub use weighter::{
    AdjustmentReason, SlotAdjustment, SlotPolicyWeighter, WeightBlend, WeighterConfig,
    compute_slot_weights, validate_weights,
};

// Collaborators and orchestration
pub use collaborators::{
    CandidateGenerator, FixedGrowthSignals, GrowthEvaluator, InMemoryRecordSource,
    PerformanceSource, RecordSource, SettlingEvaluator, StaticCandidateGenerator,
    StaticPerformanceSource,
};
pub use orchestrator::{
    PolicyOrchestrator, PolicyOrchestratorBuilder, SelectionMode, SelectionOutcome, SlotChoice,
};
pub use performance::{PostAttribution, WindowStats, aggregate_performance, window_stats};

// Observability
pub use observe::{
    BroadcastEventSink, Collaborator, NoOpEventSink, PolicyEvent, PolicyEventSink,
    TracingEventSink, init_test_tracing, init_tracing,
};
