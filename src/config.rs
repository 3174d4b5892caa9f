//! Recognised configuration keys (spec §6) and their defaults.
//!
//! Loaded the way the teacher loads other domain configs: a plain
//! `serde`-derived struct, deserialisable from JSON via `serde_json`. No
//! dedicated config-loading crate is introduced.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Fixed EUR cost per trade.
    pub transaction_fee_fixed: f64,
    /// Per-trade percentage cost (decimal, e.g. 0.001 = 0.1%).
    pub transaction_fee_percent: f64,
    /// Hard cap per symbol (`MAX_CONCENTRATION`).
    pub max_position_pct: f64,
    /// Minimum non-zero position size.
    pub min_position_pct: f64,
    /// Floor on EUR value for worthwhileness.
    pub min_trade_value: f64,
    /// Fraction of portfolio kept as cash.
    pub min_cash_buffer: f64,

    /// Safety-gate cooldowns, in days.
    pub buy_cooldown_days: i64,
    pub sell_cooldown_days: i64,

    /// Sell-eligibility bounds.
    pub min_hold_days: i64,
    pub max_loss_threshold: f64,

    /// Frequency limiter.
    pub trade_frequency_limits_enabled: bool,
    pub min_time_between_trades_minutes: i64,
    pub max_trades_per_day: u32,
    pub max_trades_per_week: u32,

    /// Scenario mode.
    pub enable_monte_carlo: bool,
    pub monte_carlo_paths: usize,
    pub enable_stochastic_scenarios: bool,

    /// Search controls.
    pub beam_width: usize,
    pub batch_size: usize,
    pub max_depth: usize,
    pub max_combinations: usize,
    pub diversity_weight: f64,

    /// Hard caps from §5's resource limits (not user-overridable upward).
    #[serde(skip)]
    pub hard_caps: HardCaps,

    #[serde(default = "default_true")]
    pub enable_correlation_aware: bool,
    #[serde(default = "default_true")]
    pub enable_early_termination: bool,
    pub min_batches_to_evaluate: u32,
    pub plateau_threshold: u32,
}

/// Non-configurable upper bounds from spec §5, enforced at the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardCaps {
    pub max_batch_size: usize,
    pub max_beam_width: usize,
    pub max_depth: usize,
    pub max_combinations: usize,
    pub max_monte_carlo_paths: usize,
}

impl Default for HardCaps {
    fn default() -> Self {
        Self {
            max_batch_size: 5000,
            max_beam_width: 100,
            max_depth: 10,
            max_combinations: 10_000,
            max_monte_carlo_paths: 500,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            transaction_fee_fixed: 1.0,
            transaction_fee_percent: 0.001,
            max_position_pct: MAX_CONCENTRATION,
            min_position_pct: 0.0,
            min_trade_value: 50.0,
            min_cash_buffer: 0.05,
            buy_cooldown_days: 30,
            sell_cooldown_days: 30,
            min_hold_days: 90,
            max_loss_threshold: -0.20,
            trade_frequency_limits_enabled: true,
            min_time_between_trades_minutes: 60,
            max_trades_per_day: 4,
            max_trades_per_week: 10,
            enable_monte_carlo: false,
            monte_carlo_paths: 100,
            enable_stochastic_scenarios: false,
            beam_width: 10,
            batch_size: 500,
            max_depth: 4,
            max_combinations: 10_000,
            diversity_weight: 0.3,
            hard_caps: HardCaps::default(),
            enable_correlation_aware: true,
            enable_early_termination: true,
            min_batches_to_evaluate: 2,
            plateau_threshold: 3,
        }
    }
}

impl PlannerConfig {
    /// Clamp user-supplied search parameters to the hard caps of §5.
    pub fn clamp_to_hard_caps(&mut self) {
        self.batch_size = self.batch_size.min(self.hard_caps.max_batch_size);
        self.beam_width = self.beam_width.min(self.hard_caps.max_beam_width);
        self.max_depth = self.max_depth.min(self.hard_caps.max_depth);
        self.max_combinations = self.max_combinations.min(self.hard_caps.max_combinations);
        self.monte_carlo_paths = self.monte_carlo_paths.min(self.hard_caps.max_monte_carlo_paths);
    }
}

/// Hard cap on any single symbol's portfolio weight (§4.1 Constraints Manager).
pub const MAX_CONCENTRATION: f64 = 0.20;
/// Hard cap on any single country-group's weight.
pub const MAX_COUNTRY_CONCENTRATION: f64 = 0.40;
/// Hard cap on any single industry-group's weight.
pub const MAX_SECTOR_CONCENTRATION: f64 = 0.35;
/// Tolerance band half-width for country-group targets.
pub const GEO_ALLOCATION_TOLERANCE: f64 = 0.10;
/// Tolerance band half-width for industry-group targets.
pub const IND_ALLOCATION_TOLERANCE: f64 = 0.08;
/// Weight cutoff `ε` below which optimiser output is dropped (§4.1 step 7).
pub const OPTIMIZER_WEIGHT_CUTOFF: f64 = 0.01;
/// Default annual target return `r*` fed to `efficient_return`.
pub const OPTIMIZER_TARGET_RETURN: f64 = 0.11;
/// Windfall threshold: return above trailing CAGR band that triggers profit-taking.
pub const WINDFALL_THRESHOLD: f64 = 0.20;
/// Minimum quality score for an averaging-down candidate.
pub const AVERAGING_DOWN_QUALITY_MIN: f64 = 0.5;
/// Minimum overweight/underweight gap (absolute) before a rebalance candidate fires.
pub const REBALANCE_GAP_THRESHOLD: f64 = 0.005;
/// Grace period (days) a flat position must remain flat before it is destroyed.
pub const POSITION_FLAT_GRACE_DAYS: i64 = 1;
