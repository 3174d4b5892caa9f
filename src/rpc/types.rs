//! Wire-level request/response DTOs for spec §6's four RPC surfaces plus the
//! health endpoint. Grounded on the original system's protobuf messages
//! (`bq_exporter.v1.*` in the teacher's `generated` module), but expressed
//! here as plain `serde`-derived structs rather than `prost`-generated types
//! (SPEC_FULL.md §C: no `.proto` toolchain is available to this crate).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::evaluator::{BeamMode, EvaluationSettings, MultiTimeframeWeights, ScenarioMode};
use crate::generator::{CombinatorialSettings, GeneratorSettings, DEFAULT_PATTERN_NAMES};
use crate::model::{Eur, GroupKey, Plan, Position, PortfolioContext, Security, Symbol};
use crate::sorted_vec_map::SortedVecMap;

/// One held position as carried on the wire (spec §6 `CreatePlan` request
/// `positions[]`). `value_eur` and the two gain fields are caller-supplied
/// redundancy the original system sends for client-side rendering; this
/// crate recomputes them from `quantity`/`avg_price`/`current_price` rather
/// than trusting the wire copy, and only reads them for the stats/metadata
/// they populate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInput {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub current_price: f64,
    pub value_eur: f64,
    pub currency: String,
    pub unrealized_gain_abs: f64,
    pub unrealized_gain_pct: f64,
    #[serde(default = "Utc::now")]
    pub opened_at: DateTime<Utc>,
    pub last_buy_at: Option<DateTime<Utc>>,
    pub last_sell_at: Option<DateTime<Utc>>,
}

impl From<&PositionInput> for Position {
    fn from(input: &PositionInput) -> Self {
        Position {
            symbol: Symbol::from(input.symbol.as_str()),
            quantity: input.quantity,
            avg_price: Eur(input.avg_price),
            current_price: Eur(input.current_price),
            opened_at: input.opened_at,
            flat_since: None,
            last_buy_at: input.last_buy_at,
            last_sell_at: input.last_sell_at,
        }
    }
}

/// One universe entry as carried on the wire (spec §6 `securities[]`).
/// `sector`/`industry` are both accepted since the spec lists them
/// separately; this crate's internal [`Security`] only models one industry
/// bucket, so `industry` wins when both are present and `sector` is used as
/// the fallback (recorded in DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityInput {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default = "default_min_lot")]
    pub min_lot: i64,
    #[serde(default = "default_true")]
    pub allow_buy: bool,
    #[serde(default = "default_true")]
    pub allow_sell: bool,
    #[serde(default)]
    pub min_portfolio_target: Option<f64>,
    #[serde(default)]
    pub max_portfolio_target: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_min_lot() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl From<&SecurityInput> for Security {
    fn from(input: &SecurityInput) -> Self {
        Security {
            symbol: Symbol::from(input.symbol.as_str()),
            isin: input.isin.clone(),
            name: input.name.clone(),
            country: input.country.clone(),
            industry: input.industry.clone().or_else(|| input.sector.clone()),
            currency: input.currency.clone(),
            price: Eur(input.price),
            min_lot: input.min_lot,
            allow_buy: input.allow_buy,
            allow_sell: input.allow_sell,
            min_portfolio_target: input.min_portfolio_target,
            max_portfolio_target: input.max_portfolio_target,
            market_cap: input.market_cap.map(Eur),
            active: input.active,
        }
    }
}

/// The `portfolio_context` summary block of spec §6's `CreatePlan` request.
/// Distinct from the crate-internal [`PortfolioContext`]: this is the thin
/// wire echo (totals a client already has on hand), plus the two group-level
/// target tables §3's `PortfolioContext` needs and the request's flat
/// `target_weights` (symbol-level, read separately) does not carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub available_cash: f64,
    pub num_positions: usize,
    #[serde(default)]
    pub country_targets: BTreeMap<String, f64>,
    #[serde(default)]
    pub industry_targets: BTreeMap<String, f64>,
}

/// Search-control parameters (spec §6 `parameters`), clamped to the hard
/// caps of spec §5 before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameters {
    pub max_depth: usize,
    pub beam_width: usize,
    pub batch_size: usize,
    pub transaction_cost_fixed: f64,
    pub transaction_cost_percent: f64,
    #[serde(default)]
    pub enable_monte_carlo: bool,
    #[serde(default = "default_true")]
    pub enable_correlation_aware: bool,
    #[serde(default = "default_true")]
    pub enable_early_termination: bool,
    #[serde(default = "default_min_batches")]
    pub min_batches_to_evaluate: u32,
    #[serde(default = "default_plateau")]
    pub plateau_threshold: u32,
}

fn default_min_batches() -> u32 {
    2
}
fn default_plateau() -> u32 {
    3
}

impl Default for SearchParameters {
    fn default() -> Self {
        let config = PlannerConfig::default();
        Self {
            max_depth: config.max_depth,
            beam_width: config.beam_width,
            batch_size: config.batch_size,
            transaction_cost_fixed: config.transaction_fee_fixed,
            transaction_cost_percent: config.transaction_fee_percent,
            enable_monte_carlo: config.enable_monte_carlo,
            enable_correlation_aware: config.enable_correlation_aware,
            enable_early_termination: config.enable_early_termination,
            min_batches_to_evaluate: config.min_batches_to_evaluate,
            plateau_threshold: config.plateau_threshold,
        }
    }
}

impl SearchParameters {
    /// Folds these request-supplied parameters into a [`PlannerConfig`],
    /// then clamps to spec §5's hard caps — a request can only ever narrow
    /// the search, never widen it past the documented resource limits.
    pub fn into_config(self, base: &PlannerConfig) -> PlannerConfig {
        let mut config = base.clone();
        config.max_depth = self.max_depth;
        config.beam_width = self.beam_width;
        config.batch_size = self.batch_size;
        config.transaction_fee_fixed = self.transaction_cost_fixed;
        config.transaction_fee_percent = self.transaction_cost_percent;
        config.enable_monte_carlo = self.enable_monte_carlo;
        config.enable_correlation_aware = self.enable_correlation_aware;
        config.enable_early_termination = self.enable_early_termination;
        config.min_batches_to_evaluate = self.min_batches_to_evaluate;
        config.plateau_threshold = self.plateau_threshold;
        config.clamp_to_hard_caps();
        config
    }
}

/// Load-balancing strategy for the evaluator pool (spec §6: only
/// `round_robin` is named).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
}

/// One evaluator endpoint in the pool (spec §6 `evaluator_config`). `name`
/// is the circuit breaker registry key; `address` is opaque to this crate
/// (a distributed deployment's transport layer resolves it to a `tonic`
/// channel — out of scope here, same as the teacher's own external gRPC
/// client construction in `transport/source.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorEndpoint {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluatorPoolConfig {
    pub endpoints: Vec<EvaluatorEndpoint>,
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
}

/// The `CreatePlan` RPC request (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub portfolio_context: PortfolioSummary,
    pub positions: Vec<PositionInput>,
    pub securities: Vec<SecurityInput>,
    pub available_cash: f64,
    #[serde(default)]
    pub target_weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub current_prices: Option<BTreeMap<String, f64>>,
    pub parameters: SearchParameters,
    #[serde(default)]
    pub evaluator_config: EvaluatorPoolConfig,
    /// Auxiliary per-symbol analytics the wire payload carries alongside
    /// the universe, since market-data ingestion is out of scope (spec §1)
    /// and these have to come from somewhere (SPEC_FULL.md A.3/D).
    #[serde(default)]
    pub quality_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub dividend_yields: BTreeMap<String, f64>,
    #[serde(default)]
    pub trailing_cagr: BTreeMap<String, f64>,
    #[serde(default)]
    pub risk_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub recently_sold: Vec<String>,
    #[serde(default)]
    pub ineligible_symbols: Vec<String>,
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl CreatePlanRequest {
    /// Assembles the crate-internal, immutable-after-construction
    /// [`PortfolioContext`] this entire pipeline reads from (spec §3).
    pub fn build_context(&self) -> PortfolioContext {
        let mut positions = SortedVecMap::new();
        for position in &self.positions {
            positions.insert(Symbol::from(position.symbol.as_str()), Position::from(position));
        }
        let mut securities = SortedVecMap::new();
        for security in &self.securities {
            securities.insert(Symbol::from(security.symbol.as_str()), Security::from(security));
        }
        if let Some(overrides) = &self.current_prices {
            for (symbol, price) in overrides {
                let key = Symbol::from(symbol.as_str());
                if let Some(position) = positions.get_mut(&key) {
                    position.current_price = Eur(*price);
                }
                if let Some(security) = securities.get_mut(&key) {
                    security.price = Eur(*price);
                }
            }
        }
        let country_targets = self
            .portfolio_context
            .country_targets
            .iter()
            .map(|(k, v)| (GroupKey(k.clone()), *v))
            .collect::<SortedVecMap<_, _>>();
        let industry_targets = self
            .portfolio_context
            .industry_targets
            .iter()
            .map(|(k, v)| (GroupKey(k.clone()), *v))
            .collect::<SortedVecMap<_, _>>();

        PortfolioContext {
            as_of: self.as_of,
            cash: Eur(self.available_cash),
            positions,
            securities,
            country_targets,
            industry_targets,
            quality_scores: as_symbol_map(&self.quality_scores),
            dividend_yields: as_symbol_map(&self.dividend_yields),
            trailing_cagr: as_symbol_map(&self.trailing_cagr),
            risk_scores: as_symbol_map(&self.risk_scores),
        }
    }

    pub fn target_weights_map(&self) -> Option<SortedVecMap<Symbol, f64>> {
        self.target_weights
            .as_ref()
            .map(|map| map.iter().map(|(k, v)| (Symbol::from(k.as_str()), *v)).collect())
    }

    pub fn recently_sold_symbols(&self) -> Vec<Symbol> {
        self.recently_sold.iter().map(|s| Symbol::from(s.as_str())).collect()
    }

    pub fn ineligible_symbols(&self) -> Vec<Symbol> {
        self.ineligible_symbols.iter().map(|s| Symbol::from(s.as_str())).collect()
    }
}

fn as_symbol_map(source: &BTreeMap<String, f64>) -> SortedVecMap<Symbol, f64> {
    source.iter().map(|(k, v)| (Symbol::from(k.as_str()), *v)).collect()
}

/// Search/pipeline counters returned alongside the plan (spec §6 `stats`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePlanStats {
    pub wall_clock_seconds: f64,
    pub opportunities_identified: usize,
    pub sequences_generated: usize,
    pub sequences_evaluated: usize,
    pub batches_processed: u64,
    pub evaluators_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanResponse {
    pub plan: Plan,
    pub stats: CreatePlanStats,
}

/// The `EvaluateSequences` RPC request (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateSequencesRequest {
    pub sequences: Vec<crate::model::Sequence>,
    pub context: PortfolioContext,
    pub settings: EvaluationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateSequencesResponse {
    pub top_sequences: Vec<crate::model::EvaluationResult>,
    pub total_evaluated: usize,
    pub beam_width: usize,
}

/// The `GenerateSequences` RPC request (spec §6), owned (no borrowed
/// `GeneratorSettings<'a>`) so it can cross an async boundary/channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSequencesRequest {
    pub opportunities: crate::opportunity::CategorisedCandidates,
    pub context: PortfolioContext,
    pub combinatorial: CombinatorialSettings,
    pub batch_size: usize,
    pub diversity_weight: f64,
    pub enable_correlation_aware: bool,
    pub same_side_cooloff_days: i64,
}

impl GenerateSequencesRequest {
    pub fn settings(&self) -> GeneratorSettings<'static> {
        GeneratorSettings {
            combinatorial: self.combinatorial.clone(),
            batch_size: self.batch_size,
            diversity_weight: self.diversity_weight,
            enable_correlation_aware: self.enable_correlation_aware,
            same_side_cooloff_days: self.same_side_cooloff_days,
            pattern_names: &DEFAULT_PATTERN_NAMES,
        }
    }
}

/// The `IdentifyOpportunities` RPC request (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyOpportunitiesRequest {
    pub context: PortfolioContext,
    pub available_cash: f64,
    #[serde(default)]
    pub target_weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub recently_sold: Vec<String>,
    #[serde(default)]
    pub ineligible_symbols: Vec<String>,
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

/// The health endpoint response (spec §6), shared by every service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub status: String,
    pub checks: BTreeMap<String, String>,
}

/// Not part of the spec's DTOs, but needed to stitch `EvaluationSettings`
/// and `CombinatorialSettings` (both `Serialize`) across the `rpc` boundary
/// without duplicating their fields here.
pub fn default_evaluation_settings(config: &PlannerConfig) -> EvaluationSettings {
    EvaluationSettings {
        beam_width: config.beam_width,
        scenario: if config.enable_monte_carlo {
            ScenarioMode::monte_carlo_default(0)
        } else if config.enable_stochastic_scenarios {
            ScenarioMode::stochastic_default()
        } else {
            ScenarioMode::Deterministic
        },
        beam_mode: BeamMode::SingleObjective,
        multi_timeframe: None::<MultiTimeframeWeights>,
        cost_penalty_factor: None,
        transaction_fee_fixed: config.transaction_fee_fixed,
        transaction_fee_percent: config.transaction_fee_percent,
        volatilities: SortedVecMap::new(),
        default_volatility: 0.25,
        priority_sort: false,
    }
}
