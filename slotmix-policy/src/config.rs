//! Policy configuration
//!
//! One TOML document holds every tunable: priors, learning, exploration,
//! rotation caps and thresholds, diversity thresholds, and selection. Every
//! table is optional; missing tables and keys fall back to defaults.
//!
//! ```toml
//! [base_weights]
//! framework = 0.15
//! story = 0.10
//!
//! [rotation]
//! max_share_per_topic = 0.30
//!
//! [selection]
//! max_results = 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diversity::DiversityConfig;
use crate::error::{PolicyError, Result};
use crate::exploration::ExplorationConfig;
use crate::rotation::{RotationConstraints, RotationThresholds};
use crate::types::{CategoryWeights, MAX_WINDOW_DAYS};
use crate::weighter::{WeighterConfig, validate_weights};

/// Default priors per content slot
const DEFAULT_PRIORS: &[(&str, f64)] = &[
    ("framework", 0.15),
    ("case_study", 0.15),
    ("myth_busting", 0.15),
    ("practical_tip", 0.20),
    ("research_insight", 0.15),
    ("contrarian", 0.10),
    ("story", 0.10),
];

/// Full configuration for the selection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fixed strategic prior per slot
    pub base_weights: CategoryWeights,
    pub weighter: WeighterConfig,
    pub exploration: ExplorationConfig,
    /// Initial rotation caps; updated at runtime through the enforcer
    pub rotation: RotationConstraints,
    pub rotation_thresholds: RotationThresholds,
    pub diversity: DiversityConfig,
    pub selection: SelectionConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_weights: default_priors(),
            weighter: WeighterConfig::default(),
            exploration: ExplorationConfig::default(),
            rotation: RotationConstraints::default(),
            rotation_thresholds: RotationThresholds::default(),
            diversity: DiversityConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

/// Selection output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Candidates returned per cycle (default: 1)
    pub max_results: usize,
    /// Fixed RNG seed for reproducible selection; entropy when unset
    pub seed: Option<u64>,
    /// Days of attribution history fed to the weighter (default: 7)
    pub performance_window_days: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_results: 1,
            seed: None,
            performance_window_days: 7,
        }
    }
}

/// The built-in slot priors
pub fn default_priors() -> CategoryWeights {
    DEFAULT_PRIORS
        .iter()
        .map(|(slot, weight)| (slot.to_string(), *weight))
        .collect()
}

impl PolicyConfig {
    /// `<config_dir>/slotmix/policy.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slotmix/policy.toml")
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load from the default path, or defaults if no file exists there
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check that the tables are consistent with each other
    pub fn validate(&self) -> Result<()> {
        if !validate_weights(&self.base_weights) {
            return Err(PolicyError::InvalidConfig(
                "base_weights must be non-negative and sum to 1".into(),
            ));
        }

        let w = &self.weighter;
        if !(w.min_multiplier > 0.0 && w.min_multiplier <= 1.0 && w.max_multiplier >= 1.0) {
            return Err(PolicyError::InvalidConfig(format!(
                "weighter clamp band [{}, {}] must contain 1",
                w.min_multiplier, w.max_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&w.learning_strength) {
            return Err(PolicyError::InvalidConfig(format!(
                "learning_strength must be in [0, 1], got {}",
                w.learning_strength
            )));
        }

        self.rotation.validate()?;

        let t = &self.rotation_thresholds;
        if t.moderate_saturation > t.heavy_saturation {
            return Err(PolicyError::InvalidConfig(
                "moderate_saturation must not exceed heavy_saturation".into(),
            ));
        }

        if self.diversity.window_size == 0 {
            return Err(PolicyError::InvalidConfig(
                "diversity window_size must be greater than 0".into(),
            ));
        }
        check_window("diversity lookback_days", self.diversity.lookback_days)?;

        if self.selection.max_results == 0 {
            return Err(PolicyError::InvalidConfig(
                "selection max_results must be greater than 0".into(),
            ));
        }
        check_window(
            "selection performance_window_days",
            self.selection.performance_window_days,
        )?;

        Ok(())
    }
}

fn check_window(field: &str, days: u32) -> Result<()> {
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(PolicyError::InvalidConfig(format!(
            "{field} must be in 1..={MAX_WINDOW_DAYS}, got {days}"
        )))
    }
}
