//! The Portfolio Optimiser (C5): blended mean-variance / hierarchical risk
//! parity allocation, feeding the weight-bound constraints the Opportunity
//! Identifier (C1) uses as rebalancing targets. Grounded on the original
//! system's `portfolio_optimizer.py`, `mean_variance_optimizer.py` and
//! `hrp_optimizer.py`.

pub mod constraints;
pub mod hrp;
pub mod mean_variance;

use ndarray::Array2;
use tracing::{info, instrument, warn};

use crate::config::{OPTIMIZER_TARGET_RETURN, OPTIMIZER_WEIGHT_CUTOFF};
use crate::error::{OptimiserError, PlannerResult};
use crate::model::{GroupKey, Position, Security, Symbol};
use crate::sorted_vec_map::SortedVecMap;

pub use constraints::{ConstraintSummary, ConstraintsManager, SectorConstraint, WeightBounds};
pub use mean_variance::MeanVarianceStrategy;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Correlation pairs at or above this are surfaced as diagnostics (SPEC_FULL
/// B.4: "top pairwise correlations above 0.80").
const HIGH_CORRELATION_THRESHOLD: f64 = 0.80;
/// Minimum absolute weight change worth reporting (SPEC_FULL B.2).
const WEIGHT_CHANGE_REPORT_THRESHOLD: f64 = 0.001;

/// Everything the optimiser needs for one `optimise` call (spec §4.1
/// "Inputs"). Market-data ingestion is out of scope (spec §1 non-goals); the
/// daily price history here is supplied by the caller, not fetched.
pub struct OptimiserInput<'a> {
    pub securities: &'a [Security],
    pub positions: &'a SortedVecMap<Symbol, Position>,
    pub total_value: f64,
    pub cash: f64,
    /// Chronologically ordered daily close prices per symbol. A symbol
    /// absent here, or with fewer than two prices, is excluded from the
    /// return/covariance inputs (step 1).
    pub price_history: &'a SortedVecMap<Symbol, Vec<f64>>,
    /// Blend parameter β ∈ [0, 1] between HRP (β) and mean-variance (1-β).
    pub beta: f64,
    /// Target annual return r* fed to `efficient_return`.
    pub target_return: f64,
    pub country_targets: &'a SortedVecMap<GroupKey, f64>,
    pub industry_targets: &'a SortedVecMap<GroupKey, f64>,
    pub min_cash_reserve: f64,
    pub dividend_bonuses: &'a SortedVecMap<Symbol, f64>,
}

impl<'a> OptimiserInput<'a> {
    pub fn new(
        securities: &'a [Security],
        positions: &'a SortedVecMap<Symbol, Position>,
        total_value: f64,
        cash: f64,
        price_history: &'a SortedVecMap<Symbol, Vec<f64>>,
        country_targets: &'a SortedVecMap<GroupKey, f64>,
        industry_targets: &'a SortedVecMap<GroupKey, f64>,
        dividend_bonuses: &'a SortedVecMap<Symbol, f64>,
    ) -> Self {
        Self {
            securities,
            positions,
            total_value,
            cash,
            price_history,
            beta: 0.5,
            target_return: OPTIMIZER_TARGET_RETURN,
            country_targets,
            industry_targets,
            min_cash_reserve: 0.05,
            dividend_bonuses,
        }
    }
}

/// A symbol whose target weight materially differs from its current one
/// (SPEC_FULL B.2: the original's `_calculate_weight_changes`), feeding C1's
/// rebalance candidate generation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightChange {
    pub symbol: Symbol,
    pub current: f64,
    pub target: f64,
    pub delta: f64,
}

/// A highly correlated symbol pair surfaced for diagnostics and consumed by
/// C2's `correlation_aware` filter (SPEC_FULL B.4).
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPair {
    pub a: Symbol,
    pub b: Symbol,
    pub correlation: f64,
}

/// Which branch(es) of the blend actually produced usable weights, echoed
/// to callers/logs the way the original's `fallback_used` field does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendSource {
    Blended,
    MeanVarianceOnly,
    HrpOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimiserOutput {
    pub target_weights: SortedVecMap<Symbol, f64>,
    pub weight_changes: Vec<WeightChange>,
    pub high_correlations: Vec<CorrelationPair>,
    pub constraint_summary: ConstraintSummary,
    pub blend_source: BlendSource,
    pub mv_strategy: Option<MeanVarianceStrategy>,
}

pub struct PortfolioOptimiser {
    constraints: ConstraintsManager,
}

impl Default for PortfolioOptimiser {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioOptimiser {
    pub fn new() -> Self {
        Self {
            constraints: ConstraintsManager::default(),
        }
    }

    /// Runs the full seven-step algorithm of spec §4.1.
    #[instrument(skip_all, fields(symbols = input.securities.len()))]
    pub fn optimise(&self, input: &OptimiserInput<'_>) -> PlannerResult<OptimiserOutput> {
        let active: Vec<&Security> = input.securities.iter().filter(|s| s.active).collect();

        // Step 1: expected returns, dropping symbols with missing history.
        let mut order: Vec<Symbol> = Vec::new();
        let mut returns_by_symbol: Vec<ndarray::Array1<f64>> = Vec::new();
        let mut expected_returns = SortedVecMap::new();
        for security in &active {
            let Some(prices) = input.price_history.get(&security.symbol) else {
                continue;
            };
            if prices.len() < 2 {
                continue;
            }
            let daily = crate::stats::simple_returns(prices);
            let annual_return = crate::stats::annualize_return(crate::stats::mean(&daily), TRADING_DAYS_PER_YEAR);
            let bonus = input.dividend_bonuses.get(&security.symbol).copied().unwrap_or(0.0);
            expected_returns.insert(security.symbol.clone(), annual_return + bonus);
            order.push(security.symbol.clone());
            returns_by_symbol.push(daily);
        }

        // Step 2: annualised covariance.
        if order.len() < 2 {
            return Err(OptimiserError::InsufficientData(format!(
                "only {} symbol(s) have usable return data, need at least 2",
                order.len()
            ))
            .into());
        }
        let daily_cov = crate::stats::covariance_matrix(&returns_by_symbol);
        let covariance: Array2<f64> = daily_cov.mapv(|c| c * TRADING_DAYS_PER_YEAR);

        // Step 3: weight bounds + sector constraints.
        let active_in_order: Vec<&Security> = order
            .iter()
            .filter_map(|symbol| active.iter().find(|s| &s.symbol == symbol).copied())
            .collect();
        let bounds = self
            .constraints
            .calculate_weight_bounds(&active_in_order, &fake_context(input));
        let (geo_constraints, ind_constraints) = self.constraints.build_sector_constraints(
            &active_in_order,
            input.country_targets,
            input.industry_targets,
        );

        // Step 4: mean-variance branch.
        let mv_result = mean_variance::run_mean_variance(
            &expected_returns,
            &covariance,
            &order,
            &bounds,
            input.target_return,
        );
        if mv_result.is_none() {
            warn!("mean-variance branch infeasible at both efficient_return and max_sharpe; falling back to HRP-only");
        }

        // Step 5: HRP branch.
        let hrp_result = hrp::hierarchical_risk_parity(&covariance, &order);

        let (blended, blend_source, mv_strategy) = match (&mv_result, &hrp_result) {
            (Some((mv_weights, strategy)), Some(hrp_weights)) => {
                let mut blended = SortedVecMap::new();
                for symbol in &order {
                    let mv_w = mv_weights.get(symbol).copied().unwrap_or(0.0);
                    let hrp_w = hrp_weights.get(symbol).copied().unwrap_or(0.0);
                    blended.insert(symbol.clone(), input.beta * hrp_w + (1.0 - input.beta) * mv_w);
                }
                (blended, BlendSource::Blended, Some(*strategy))
            }
            (Some((mv_weights, strategy)), None) => (mv_weights.clone(), BlendSource::MeanVarianceOnly, Some(*strategy)),
            (None, Some(hrp_weights)) => (hrp_weights.clone(), BlendSource::HrpOnly, None),
            (None, None) => {
                return Err(OptimiserError::OptimizerInfeasible(
                    "both the mean-variance and HRP branches failed to produce weights".to_string(),
                )
                .into());
            }
        };

        // Step 7: cutoff + renormalise to `1 - cash_reserve_fraction`.
        let target_sum = (1.0 - input.min_cash_reserve).max(0.0);
        let mut target_weights = SortedVecMap::new();
        let mut retained_sum = 0.0;
        for (symbol, weight) in blended.iter() {
            if *weight >= OPTIMIZER_WEIGHT_CUTOFF {
                target_weights.insert(symbol.clone(), *weight);
                retained_sum += *weight;
            }
        }
        if retained_sum > 0.0 {
            let scale = target_sum / retained_sum;
            for weight in target_weights.values_mut() {
                *weight *= scale;
            }
        }

        let weight_changes = self.weight_change_report(input, &target_weights);
        let high_correlations = Self::high_correlation_report(&order, &covariance);
        let constraint_summary = self
            .constraints
            .get_constraint_summary(&bounds, &geo_constraints, &ind_constraints);

        info!(
            symbols = order.len(),
            blend_source = ?blend_source,
            "portfolio optimisation complete"
        );

        Ok(OptimiserOutput {
            target_weights,
            weight_changes,
            high_correlations,
            constraint_summary,
            blend_source,
            mv_strategy,
        })
    }

    fn weight_change_report(
        &self,
        input: &OptimiserInput<'_>,
        target_weights: &SortedVecMap<Symbol, f64>,
    ) -> Vec<WeightChange> {
        let mut changes = Vec::new();
        let mut symbols: std::collections::BTreeSet<Symbol> =
            target_weights.iter().map(|(s, _)| s.clone()).collect();
        for (symbol, _) in input.positions.iter() {
            symbols.insert(symbol.clone());
        }
        for symbol in symbols {
            let current = input
                .positions
                .get(&symbol)
                .map(|p| p.market_value().0 / input.total_value.max(1e-9))
                .unwrap_or(0.0);
            let target = target_weights.get(&symbol).copied().unwrap_or(0.0);
            let delta = target - current;
            if delta.abs() > WEIGHT_CHANGE_REPORT_THRESHOLD {
                changes.push(WeightChange {
                    symbol,
                    current,
                    target,
                    delta,
                });
            }
        }
        changes.sort_by(|a, b| b.delta.abs().partial_cmp(&a.delta.abs()).unwrap_or(std::cmp::Ordering::Equal));
        changes
    }

    fn high_correlation_report(order: &[Symbol], covariance: &Array2<f64>) -> Vec<CorrelationPair> {
        let correlation = crate::stats::correlation_matrix(covariance);
        let mut pairs = Vec::new();
        for i in 0..order.len() {
            for j in (i + 1)..order.len() {
                let corr = correlation[[i, j]];
                if corr >= HIGH_CORRELATION_THRESHOLD {
                    pairs.push(CorrelationPair {
                        a: order[i].clone(),
                        b: order[j].clone(),
                        correlation: corr,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.correlation.partial_cmp(&a.correlation).unwrap_or(std::cmp::Ordering::Equal));
        pairs
    }
}

/// `ConstraintsManager` takes a `PortfolioContext` for weight lookups; the
/// optimiser only has the looser `OptimiserInput` shape (it predates and is
/// reused outside full request contexts in tests), so this builds a
/// throwaway context scoped to the symbols the constraints manager needs.
fn fake_context(input: &OptimiserInput<'_>) -> crate::model::PortfolioContext {
    crate::model::PortfolioContext {
        as_of: chrono::Utc::now(),
        cash: crate::model::Eur(input.cash),
        positions: input.positions.clone(),
        securities: {
            let mut map = SortedVecMap::new();
            for security in input.securities {
                map.insert(security.symbol.clone(), security.clone());
            }
            map
        },
        country_targets: input.country_targets.clone(),
        industry_targets: input.industry_targets.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Eur;

    fn security(symbol: &str) -> Security {
        Security::new(symbol, symbol, Eur(100.0))
    }

    #[test]
    fn insufficient_data_when_fewer_than_two_symbols_have_history() {
        let optimiser = PortfolioOptimiser::new();
        let securities = vec![security("A"), security("B")];
        let positions = SortedVecMap::new();
        let mut history = SortedVecMap::new();
        history.insert(Symbol::from("A"), vec![100.0, 101.0, 102.0]);
        let country_targets = SortedVecMap::new();
        let industry_targets = SortedVecMap::new();
        let bonuses = SortedVecMap::new();
        let input = OptimiserInput::new(
            &securities,
            &positions,
            10_000.0,
            1_000.0,
            &history,
            &country_targets,
            &industry_targets,
            &bonuses,
        );
        let result = optimiser.optimise(&input);
        assert!(result.is_err());
    }

    #[test]
    fn blended_weights_are_non_negative_and_within_cash_reserve() {
        let optimiser = PortfolioOptimiser::new();
        let securities = vec![security("A"), security("B"), security("C")];
        let positions = SortedVecMap::new();
        let mut history = SortedVecMap::new();
        history.insert(Symbol::from("A"), synthetic_prices(100.0, 0.0006, 0.01));
        history.insert(Symbol::from("B"), synthetic_prices(50.0, 0.0004, 0.02));
        history.insert(Symbol::from("C"), synthetic_prices(80.0, 0.0005, 0.015));
        let country_targets = SortedVecMap::new();
        let industry_targets = SortedVecMap::new();
        let bonuses = SortedVecMap::new();
        let mut input = OptimiserInput::new(
            &securities,
            &positions,
            10_000.0,
            1_000.0,
            &history,
            &country_targets,
            &industry_targets,
            &bonuses,
        );
        input.min_cash_reserve = 0.1;
        let output = optimiser.optimise(&input).unwrap();
        let sum: f64 = output.target_weights.values().sum();
        assert!(sum <= 0.9 + 1e-6);
        assert!(output.target_weights.values().all(|&w| w >= 0.0));
    }

    fn synthetic_prices(start: f64, drift: f64, amplitude: f64) -> Vec<f64> {
        let mut prices = Vec::with_capacity(120);
        let mut price = start;
        for i in 0..120 {
            let wiggle = amplitude * ((i as f64) * 0.3).sin();
            price *= 1.0 + drift + wiggle * 0.01;
            prices.push(price);
        }
        prices
    }
}
