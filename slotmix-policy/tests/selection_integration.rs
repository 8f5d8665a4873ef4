//! Integration tests for full selection cycles
//!
//! Drives `PolicyOrchestrator` through the public API with in-memory
//! collaborators, a seeded RNG and occasionally failing services.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use slotmix_policy::{
    CandidateGenerator, ContentCandidate, ContentRecord, FixedGrowthSignals, GrowthEvaluator,
    GrowthTrend, InMemoryRecordSource, PerformanceSource, PerformanceSummary, PolicyConfig,
    PolicyError, PolicyEvent, PolicyOrchestrator, PostAttribution, RecordSource, Result,
    RotationConstraintsUpdate, RotationHealth, SelectionMode, SettlingEvaluator,
    StaticCandidateGenerator, StaticPerformanceSource,
};

// =============================================================================
// Test Helpers
// =============================================================================

/// Collaborator whose every call fails
struct Unavailable;

fn offline<T>() -> Result<T> {
    Err(PolicyError::Collaborator("connection refused".into()))
}

#[async_trait]
impl RecordSource for Unavailable {
    async fn recent_records(&self, _window_days: u32) -> Result<Vec<ContentRecord>> {
        offline()
    }
}

#[async_trait]
impl PerformanceSource for Unavailable {
    async fn performance_by_slot(
        &self,
        _window_days: u32,
    ) -> Result<HashMap<String, PerformanceSummary>> {
        offline()
    }
}

#[async_trait]
impl GrowthEvaluator for Unavailable {
    async fn growth_trend(&self) -> Result<GrowthTrend> {
        offline()
    }
}

#[async_trait]
impl SettlingEvaluator for Unavailable {
    async fn is_settling(&self) -> Result<bool> {
        offline()
    }
}

#[async_trait]
impl CandidateGenerator for Unavailable {
    async fn candidates(&self, _slot: &str) -> Result<Vec<ContentCandidate>> {
        offline()
    }
}

fn seeded_config(seed: u64) -> PolicyConfig {
    let mut config = PolicyConfig::default();
    config.selection.seed = Some(seed);
    config
}

/// `keto` topic count out of `total` records, distinct angles throughout
fn records_with_keto(keto: usize, total: usize) -> Vec<ContentRecord> {
    (0..total)
        .map(|i| {
            let topic = if i < keto {
                "keto".to_string()
            } else {
                format!("topic_{i}")
            };
            ContentRecord::new(format!("r{i}"), Utc::now() - Duration::hours(i as i64 + 1))
                .with_topic(topic)
                .with_angle(format!("angle_{i}"))
        })
        .collect()
}

/// The same candidate pool for every default slot
fn generator_for_all_slots(candidates: Vec<ContentCandidate>) -> StaticCandidateGenerator {
    PolicyConfig::default()
        .base_weights
        .keys()
        .fold(StaticCandidateGenerator::new(), |generator, slot| {
            generator.with_slot(slot.clone(), candidates.clone())
        })
}

// =============================================================================
// Selection cycles
// =============================================================================

#[tokio::test]
async fn test_strong_slot_is_boosted_then_renormalized() {
    let performance = StaticPerformanceSource::default()
        .with_summary(PerformanceSummary::new("framework", Some(0.9), 20));
    let orchestrator = PolicyOrchestrator::builder(seeded_config(1))
        .performance_source(Arc::new(performance))
        .build()
        .unwrap();

    let outcome = orchestrator.select(1).await;

    // framework: 0.15 × (1 + 0.3 × 0.8) = 0.186, total 1.036
    assert!((outcome.weights["framework"] - 0.186 / 1.036).abs() < 1e-9);
    assert!((outcome.weights["practical_tip"] - 0.20 / 1.036).abs() < 1e-9);
    let sum: f64 = outcome.weights.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_settling_overrides_accelerating_growth() {
    let signals = Arc::new(FixedGrowthSignals::new(GrowthTrend::Accelerating, true));
    let orchestrator = PolicyOrchestrator::builder(seeded_config(2))
        .growth_evaluator(signals.clone())
        .settling_evaluator(signals)
        .build()
        .unwrap();

    let outcome = orchestrator.select(1).await;
    assert!((outcome.exploration.rate - 0.7).abs() < 1e-9);
    assert!(outcome.exploration.reasoning.starts_with("settling"));
}

#[tokio::test]
async fn test_topic_over_cap_is_flagged_and_filtered() {
    // 9 of 25 = 36% keto against the 35% cap
    let records = records_with_keto(9, 25);
    let generator = generator_for_all_slots(vec![
        ContentCandidate::new("keto-1", "keto", "fresh_angle", 0.9),
        ContentCandidate::new("sleep-1", "sleep", "other_angle", 0.4),
    ]);
    let orchestrator = PolicyOrchestrator::builder(seeded_config(3))
        .record_source(Arc::new(InMemoryRecordSource::with_records(records)))
        .candidate_generator(Arc::new(generator))
        .build()
        .unwrap();

    let status = orchestrator.rotation_status().await;
    assert_eq!(status.health, RotationHealth::Critical);
    assert_eq!(status.snapshot.violations, vec!["topic:keto:36.0%".to_string()]);

    let keto = ContentCandidate::new("probe", "keto", "fresh_angle", 0.5);
    assert!(orchestrator.enforcer().would_violate(&keto, &status.snapshot));

    let outcome = orchestrator.select(2).await;
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[0].id, "sleep-1");
    assert_eq!(outcome.rejected, vec!["keto-1".to_string()]);
    assert!(!outcome.fallback_used);
}

#[tokio::test]
async fn test_fully_saturated_batch_keeps_one_candidate() {
    let records = records_with_keto(20, 20);
    let generator = generator_for_all_slots(
        (0..5)
            .map(|i| ContentCandidate::new(format!("k{i}"), "keto", "myth", 0.3 + i as f64 * 0.1))
            .collect(),
    );
    let orchestrator = PolicyOrchestrator::builder(seeded_config(4))
        .record_source(Arc::new(InMemoryRecordSource::with_records(records)))
        .candidate_generator(Arc::new(generator))
        .build()
        .unwrap();

    let outcome = orchestrator.select(5).await;

    assert!(outcome.fallback_used);
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[0].id, "k4");
    assert_eq!(outcome.rejected.len(), 4);
}

#[tokio::test]
async fn test_every_service_down_still_produces_a_slot() {
    let down = Arc::new(Unavailable);
    let orchestrator = PolicyOrchestrator::builder(seeded_config(5))
        .record_source(down.clone())
        .performance_source(down.clone())
        .growth_evaluator(down.clone())
        .settling_evaluator(down.clone())
        .candidate_generator(down)
        .build()
        .unwrap();

    let outcome = orchestrator.select(1).await;

    let slot = outcome.slot().unwrap();
    assert!(orchestrator.base_weights().contains_key(slot));
    assert_eq!(outcome.exploration.reasoning, "flat: balanced exploration");
    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.fallbacks(), 5);
    assert!(outcome.events.iter().any(|e| matches!(
        e,
        PolicyEvent::CollaboratorFailed { error, .. } if error.contains("connection refused")
    )));

    let health = orchestrator.diversity_health().await;
    assert!(health.healthy);
}

#[tokio::test]
async fn test_seeded_orchestrators_agree() {
    let build = || {
        PolicyOrchestrator::builder(seeded_config(99))
            .growth_evaluator(Arc::new(FixedGrowthSignals::new(GrowthTrend::Growing, false)))
            .build()
            .unwrap()
    };
    let (first, second) = (build(), build());

    let mut explored = 0;
    for _ in 0..50 {
        let a = first.select(1).await;
        let b = second.select(1).await;
        assert_eq!(a.choice, b.choice);
        if a.mode() == Some(SelectionMode::Explore) {
            explored += 1;
        }
    }
    // 0.4 exploration rate; never collapses to pure exploitation
    assert!(explored > 0);
}

#[tokio::test]
async fn test_attribution_rows_drive_weights() {
    let now = Utc::now();
    let row = |slot: &str, engagement: f64, i: i64| PostAttribution {
        post_id: format!("{slot}-{i}"),
        content_slot: slot.to_string(),
        topic: None,
        generator_used: Some("coach".into()),
        hook_pattern: None,
        engagement_rate: Some(engagement),
        impressions: Some(500),
        followers_gained: Some(1),
        posted_at: now - Duration::hours(i + 1),
    };
    let mut rows: Vec<PostAttribution> = (0..12).map(|i| row("story", 0.08, i)).collect();
    rows.extend((0..12).map(|i| row("contrarian", 0.01, i)));

    let orchestrator = PolicyOrchestrator::builder(seeded_config(6))
        .performance_source(Arc::new(StaticPerformanceSource::from_attributions(&rows, now, 7)))
        .build()
        .unwrap();

    let outcome = orchestrator.select(1).await;
    assert!(outcome.weights["story"] > outcome.weights["contrarian"]);
    assert!(outcome.weights["story"] > 0.10);
}

#[tokio::test]
async fn test_config_file_and_runtime_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.toml");
    std::fs::write(
        &path,
        r#"
        [rotation]
        max_share_per_topic = 0.5

        [selection]
        max_results = 2
        seed = 12
        "#,
    )
    .unwrap();
    let config = PolicyConfig::load(&path).unwrap();

    let records = records_with_keto(9, 25);
    let orchestrator = PolicyOrchestrator::builder(config)
        .record_source(Arc::new(InMemoryRecordSource::with_records(records)))
        .build()
        .unwrap();
    assert_eq!(orchestrator.max_results(), 2);
    assert_eq!(orchestrator.rotation_status().await.health, RotationHealth::Healthy);

    orchestrator
        .update_rotation_constraints(&RotationConstraintsUpdate::default().topic(0.3))
        .unwrap();
    assert_eq!(orchestrator.rotation_status().await.health, RotationHealth::Critical);

    assert!(
        orchestrator
            .update_rotation_constraints(&RotationConstraintsUpdate::default().angle(1.5))
            .is_err()
    );
    let constraints = orchestrator.enforcer().constraints();
    assert!((constraints.max_share_per_topic - 0.3).abs() < f64::EPSILON);
    assert!((constraints.max_share_per_angle - 0.40).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_orchestrator_across_tasks() {
    let orchestrator = Arc::new(
        PolicyOrchestrator::builder(seeded_config(7))
            .candidate_generator(Arc::new(generator_for_all_slots(vec![
                ContentCandidate::new("c1", "sleep", "science", 0.6),
            ])))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    let update = RotationConstraintsUpdate::default().topic(0.3 + i as f64 * 0.05);
                    orchestrator.update_rotation_constraints(&update).unwrap();
                }
                orchestrator.select(1).await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.slot().is_some());
        assert_eq!(outcome.candidates.len(), 1);
    }

    // Whichever update landed last, it is one of the written values
    let topic = orchestrator.enforcer().constraints().max_share_per_topic;
    assert!([0.3, 0.4, 0.5, 0.6].iter().any(|v| (topic - v).abs() < 1e-9));
}
