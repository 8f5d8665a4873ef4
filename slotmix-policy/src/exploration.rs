//! Exploration-rate controller
//!
//! Turns the growth and settling signals into the share of selections that
//! ignore learned preference. The table is evaluated in priority order:
//!
//! | Signal                     | Rate |
//! |----------------------------|------|
//! | settling                   | 0.7  |
//! | declining                  | 0.9  |
//! | growing / accelerating     | 0.4  |
//! | flat                       | 0.5  |
//!
//! Whatever the table produces, the rate is floored at
//! [`MIN_EXPLORATION_RATE`] so the policy can never converge completely.

use serde::{Deserialize, Serialize};

use crate::types::{ExplorationDecision, GrowthTrend};

/// Hard floor on the exploration rate; configuration can raise it, never lower it
pub const MIN_EXPLORATION_RATE: f64 = 0.3;

/// Exploration rates per signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Rate while performance has plateaued (default: 0.7)
    pub settling_rate: f64,
    /// Rate while growth is declining (default: 0.9)
    pub declining_rate: f64,
    /// Rate while growing or accelerating (default: 0.4)
    pub growing_rate: f64,
    /// Rate while growth is flat (default: 0.5)
    pub flat_rate: f64,
    /// Configured floor, never below MIN_EXPLORATION_RATE (default: 0.3)
    pub floor: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            settling_rate: 0.7,
            declining_rate: 0.9,
            growing_rate: 0.4,
            flat_rate: 0.5,
            floor: MIN_EXPLORATION_RATE,
        }
    }
}

/// Derives the exploration/exploitation split for a selection cycle
#[derive(Debug, Clone, Default)]
pub struct ExplorationController {
    config: ExplorationConfig,
}

impl ExplorationController {
    pub fn new(config: ExplorationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    /// Decide the exploration rate from the current growth signals
    pub fn decide(&self, trend: GrowthTrend, is_settling: bool) -> ExplorationDecision {
        let (rate, reasoning) = if is_settling {
            (
                self.config.settling_rate,
                "settling detected: forcing exploration to break the plateau",
            )
        } else {
            match trend {
                GrowthTrend::Declining => (
                    self.config.declining_rate,
                    "declining: maximum exploration to find new approaches",
                ),
                GrowthTrend::Growing | GrowthTrend::Accelerating => (
                    self.config.growing_rate,
                    "growing: keep exploring despite success",
                ),
                GrowthTrend::Flat => (self.config.flat_rate, "flat: balanced exploration"),
            }
        };

        let floor = self.config.floor.max(MIN_EXPLORATION_RATE);
        let mut rate = if rate.is_nan() { floor } else { rate };
        if rate < floor {
            rate = floor;
        }

        ExplorationDecision {
            rate: rate.min(1.0),
            reasoning: reasoning.to_string(),
        }
    }
}

/// Decide the exploration rate with the default rate table
pub fn compute_exploration_rate(trend: GrowthTrend, is_settling: bool) -> ExplorationDecision {
    ExplorationController::default().decide(trend, is_settling)
}
