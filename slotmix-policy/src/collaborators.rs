//! External collaborator interfaces
//!
//! The policy never talks to storage, analytics or generation directly; it
//! awaits these traits. Retries and timeouts belong to the implementations.
//! In-memory implementations are provided for embedding and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::types::{ContentCandidate, ContentRecord, GrowthTrend, PerformanceSummary, window_start};

/// Recent published content with its category dimensions
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records created within the last `window_days` days
    async fn recent_records(&self, window_days: u32) -> Result<Vec<ContentRecord>>;
}

/// Aggregated engagement per slot
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn performance_by_slot(
        &self,
        window_days: u32,
    ) -> Result<HashMap<String, PerformanceSummary>>;
}

/// Follower growth direction
#[async_trait]
pub trait GrowthEvaluator: Send + Sync {
    async fn growth_trend(&self) -> Result<GrowthTrend>;
}

/// Plateau detection on recent performance
#[async_trait]
pub trait SettlingEvaluator: Send + Sync {
    async fn is_settling(&self) -> Result<bool>;
}

/// Produces concrete candidates for a chosen slot
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn candidates(&self, slot: &str) -> Result<Vec<ContentCandidate>>;
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    records: RwLock<Vec<ContentRecord>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ContentRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn push(&self, record: ContentRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn recent_records(&self, window_days: u32) -> Result<Vec<ContentRecord>> {
        let cutoff = window_start(Utc::now(), window_days);
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| r.created_at >= cutoff)
            .cloned()
            .collect())
    }
}

/// Fixed performance summaries
#[derive(Debug, Clone, Default)]
pub struct StaticPerformanceSource {
    summaries: HashMap<String, PerformanceSummary>,
}

impl StaticPerformanceSource {
    pub fn new(summaries: HashMap<String, PerformanceSummary>) -> Self {
        Self { summaries }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: PerformanceSummary) -> Self {
        self.summaries.insert(summary.category.clone(), summary);
        self
    }
}

#[async_trait]
impl PerformanceSource for StaticPerformanceSource {
    async fn performance_by_slot(
        &self,
        _window_days: u32,
    ) -> Result<HashMap<String, PerformanceSummary>> {
        Ok(self.summaries.clone())
    }
}

/// Growth and settling signals pinned to fixed values
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedGrowthSignals {
    pub trend: GrowthTrend,
    pub settling: bool,
}

impl FixedGrowthSignals {
    pub fn new(trend: GrowthTrend, settling: bool) -> Self {
        Self { trend, settling }
    }
}

#[async_trait]
impl GrowthEvaluator for FixedGrowthSignals {
    async fn growth_trend(&self) -> Result<GrowthTrend> {
        Ok(self.trend)
    }
}

#[async_trait]
impl SettlingEvaluator for FixedGrowthSignals {
    async fn is_settling(&self) -> Result<bool> {
        Ok(self.settling)
    }
}

/// Candidate pools keyed by slot
#[derive(Debug, Clone, Default)]
pub struct StaticCandidateGenerator {
    by_slot: HashMap<String, Vec<ContentCandidate>>,
}

impl StaticCandidateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>, candidates: Vec<ContentCandidate>) -> Self {
        self.by_slot.insert(slot.into(), candidates);
        self
    }
}

#[async_trait]
impl CandidateGenerator for StaticCandidateGenerator {
    async fn candidates(&self, slot: &str) -> Result<Vec<ContentCandidate>> {
        Ok(self.by_slot.get(slot).cloned().unwrap_or_default())
    }
}
