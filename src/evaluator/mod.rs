//! The Sequence Evaluator (C3): simulates each candidate sequence against a
//! portfolio snapshot and scores the resulting end state (spec §4.4).
//! Grounded on the original system's `sequence_evaluator.py` and its
//! scenario-mode variants; the Monte Carlo sampling mirrors the teacher's
//! own use of `rand_distr` for stochastic price simulation in
//! `gym/flow/generator.rs`.

use std::cmp::Ordering;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::model::{Eur, EvaluationResult, GroupKey, PortfolioContext, Position, Sequence, Side, Symbol};
use crate::sorted_vec_map::SortedVecMap;

/// Weight of each constituent in the end-state blend (spec §4.4 names the
/// constituents without literal weights; resolved here and recorded in
/// DESIGN.md).
const W_DIVERSIFICATION: f64 = 0.30;
const W_STABILITY: f64 = 0.25;
const W_QUALITY: f64 = 0.20;
const W_DIVIDEND: f64 = 0.10;
const W_GROWTH: f64 = 0.15;

/// Sub-score weights within the diversification blend (spec §4.4, literal).
const W_COUNTRY_GAP: f64 = 0.40;
const W_INDUSTRY_GAP: f64 = 0.30;
const W_AVERAGING_QUALITY: f64 = 0.30;

/// Default global price shifts for stochastic scenario mode (spec §4.4).
pub const DEFAULT_STOCHASTIC_SHIFTS: [f64; 5] = [-0.10, -0.05, 0.0, 0.05, 0.10];
const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Clamp applied to the Monte Carlo per-symbol price factor (spec §4.4).
const MONTE_CARLO_FACTOR_CLAMP: (f64, f64) = (0.5, 2.0);

/// Mutually exclusive scenario modes a request selects (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioMode {
    Deterministic,
    Stochastic { shifts: Vec<f64> },
    MonteCarlo { paths: usize, seed: u64 },
}

impl ScenarioMode {
    pub fn stochastic_default() -> Self {
        Self::Stochastic {
            shifts: DEFAULT_STOCHASTIC_SHIFTS.to_vec(),
        }
    }

    pub fn monte_carlo_default(seed: u64) -> Self {
        Self::MonteCarlo { paths: 100, seed }
    }
}

/// How the coordinator-facing beam is maintained (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeamMode {
    #[default]
    SingleObjective,
    ParetoFront,
}

/// Multi-timeframe blend weights (spec §4.4, optional): resolved here as a
/// reweighting of the same constituents toward near-term stability (short)
/// or long-term growth (long), with the default blend sitting in the
/// middle (medium) — recorded as an Open Question decision in DESIGN.md.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MultiTimeframeWeights {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

impl Default for MultiTimeframeWeights {
    fn default() -> Self {
        Self {
            short: 0.2,
            medium: 0.3,
            long: 0.5,
        }
    }
}

/// Everything one `evaluate` call needs beyond the sequence itself (spec §6
/// `EvaluateSequences`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSettings {
    pub beam_width: usize,
    pub scenario: ScenarioMode,
    pub beam_mode: BeamMode,
    pub multi_timeframe: Option<MultiTimeframeWeights>,
    pub cost_penalty_factor: Option<f64>,
    pub transaction_fee_fixed: f64,
    pub transaction_fee_percent: f64,
    /// Annualised per-symbol volatility feeding the Monte Carlo price walk;
    /// a symbol absent here falls back to `default_volatility`.
    pub volatilities: SortedVecMap<Symbol, f64>,
    pub default_volatility: f64,
    /// Sort the input batch by sum of per-action priority descending before
    /// evaluation (spec §4.4 "priority sorting").
    pub priority_sort: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            beam_width: 10,
            scenario: ScenarioMode::Deterministic,
            beam_mode: BeamMode::default(),
            multi_timeframe: None,
            cost_penalty_factor: None,
            transaction_fee_fixed: 1.0,
            transaction_fee_percent: 0.001,
            volatilities: SortedVecMap::new(),
            default_volatility: 0.25,
            priority_sort: false,
        }
    }
}

/// The copy of portfolio state produced by simulating one sequence (spec
/// §4.4 step 1).
struct SimulatedState {
    positions: SortedVecMap<Symbol, Position>,
    cash: f64,
    total_cost: f64,
    feasible: bool,
}

pub struct SequenceEvaluator;

impl Default for SequenceEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates every sequence in a batch and returns the top-`beam_width`
    /// by score (spec §4.4). Infeasible sequences are scored but sink to
    /// the bottom of the ranking rather than being dropped, so a caller can
    /// still see why nothing survived.
    #[instrument(skip_all, fields(sequences = sequences.len(), beam_width = settings.beam_width))]
    pub fn evaluate(
        &self,
        sequences: &[Sequence],
        context: &PortfolioContext,
        settings: &EvaluationSettings,
    ) -> Vec<EvaluationResult> {
        let mut ordered: Vec<&Sequence> = sequences.iter().collect();
        if settings.priority_sort {
            ordered.sort_by(|a, b| priority_sum(b).partial_cmp(&priority_sum(a)).unwrap_or(Ordering::Equal));
        }

        let results: Vec<EvaluationResult> = ordered
            .into_iter()
            .map(|sequence| self.evaluate_one(sequence, context, settings))
            .collect();

        let beam = match settings.beam_mode {
            BeamMode::SingleObjective => top_k_by_score(results, settings.beam_width),
            BeamMode::ParetoFront => pareto_front(results, settings.beam_width),
        };
        debug!(kept = beam.len(), "sequence evaluation complete");
        beam
    }

    fn evaluate_one(&self, sequence: &Sequence, context: &PortfolioContext, settings: &EvaluationSettings) -> EvaluationResult {
        match &settings.scenario {
            ScenarioMode::Deterministic => {
                let state = simulate(sequence, context, settings, |_, price| price);
                self.score(sequence, context, &state, settings)
            }
            ScenarioMode::Stochastic { shifts } => {
                let scored: Vec<EvaluationResult> = shifts
                    .iter()
                    .map(|&shift| {
                        let state = simulate(sequence, context, settings, move |_, price| price * (1.0 + shift));
                        self.score(sequence, context, &state, settings)
                    })
                    .collect();
                blend_scenarios(sequence, &scored, 0.6, 0.4, None)
            }
            ScenarioMode::MonteCarlo { paths, seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let scored: Vec<EvaluationResult> = (0..*paths)
                    .map(|_| {
                        let factors = monte_carlo_factors(sequence, settings, &mut rng);
                        let state = simulate(sequence, context, settings, move |symbol, price| {
                            price * factors.get(symbol).copied().unwrap_or(1.0)
                        });
                        self.score(sequence, context, &state, settings)
                    })
                    .collect();
                blend_scenarios(sequence, &scored, 0.4, 0.3, Some(0.3))
            }
        }
    }

    fn score(
        &self,
        sequence: &Sequence,
        before: &PortfolioContext,
        state: &SimulatedState,
        settings: &EvaluationSettings,
    ) -> EvaluationResult {
        if !state.feasible {
            return EvaluationResult::infeasible(sequence.clone(), "cash balance went negative mid-sequence");
        }

        let after = apply_state(before, state);
        let diversification = diversification_score(before, &after, sequence);
        let stability = stability_score(&after);
        let quality = quality_score(&after);
        let dividend = dividend_score(&after);
        let growth = growth_score(&after);

        let base_end_state = W_DIVERSIFICATION * diversification
            + W_STABILITY * stability
            + W_QUALITY * quality
            + W_DIVIDEND * dividend
            + W_GROWTH * growth;

        let end_state_score = match settings.multi_timeframe {
            Some(weights) => {
                let short = 0.5 * stability + 0.3 * diversification + 0.2 * quality;
                let long = 0.5 * growth + 0.3 * diversification + 0.2 * quality;
                weights.short * short + weights.medium * base_end_state + weights.long * long
            }
            None => base_end_state,
        };

        let total_value = after.total_value().0.max(1.0);
        let cost_penalty = settings
            .cost_penalty_factor
            .map(|factor| factor * state.total_cost / total_value)
            .unwrap_or(0.0);
        let total_score = end_state_score - cost_penalty;

        let risk_score = 1.0 - stability;

        let mut metrics = SortedVecMap::new();
        metrics.insert("diversification".to_string(), diversification);
        metrics.insert("stability".to_string(), stability);
        metrics.insert("quality".to_string(), quality);
        metrics.insert("dividend".to_string(), dividend);
        metrics.insert("growth".to_string(), growth);
        metrics.insert("cost_penalty".to_string(), cost_penalty);

        EvaluationResult {
            sequence: sequence.clone(),
            end_state_score: total_score,
            diversification_score: diversification,
            risk_score,
            total_score,
            total_cost: Eur(state.total_cost),
            cash_required: Eur((-sequence.cumulative_cash_delta().0).max(0.0)),
            feasible: true,
            metrics,
            reason: None,
        }
    }
}

fn priority_sum(sequence: &Sequence) -> f64 {
    sequence.steps().iter().map(|step| step.priority).sum()
}

/// Applies every step of `sequence` to a cloned copy of `context`'s state,
/// tracking cash and cumulative transaction cost (spec §4.4 step 1).
/// `price_factor` lets callers apply a scenario shift to each symbol's
/// execution price without mutating the shared context.
fn simulate(
    sequence: &Sequence,
    context: &PortfolioContext,
    settings: &EvaluationSettings,
    price_factor: impl Fn(&Symbol, f64) -> f64,
) -> SimulatedState {
    let mut positions = context.positions.clone();
    let mut cash = context.cash.0;
    let mut total_cost = 0.0;
    let mut feasible = true;

    for step in sequence.steps() {
        let execution_price = price_factor(&step.symbol, step.unit_price.0);
        let gross_value = step.quantity as f64 * execution_price;
        let cost = settings.transaction_fee_fixed + gross_value * settings.transaction_fee_percent;
        total_cost += cost;

        match step.side {
            Side::Buy => {
                cash -= gross_value + cost;
                let entry = positions.get(&step.symbol).cloned();
                let (new_quantity, new_avg_price) = match &entry {
                    Some(existing) => {
                        let total_quantity = existing.quantity + step.quantity;
                        let new_avg = if total_quantity > 0 {
                            (existing.avg_price.0 * existing.quantity as f64 + execution_price * step.quantity as f64)
                                / total_quantity as f64
                        } else {
                            existing.avg_price.0
                        };
                        (total_quantity, new_avg)
                    }
                    None => (step.quantity, execution_price),
                };
                positions.insert(
                    step.symbol.clone(),
                    Position {
                        symbol: step.symbol.clone(),
                        quantity: new_quantity,
                        avg_price: Eur(new_avg_price),
                        current_price: Eur(execution_price),
                        opened_at: entry.as_ref().map(|p| p.opened_at).unwrap_or(context.as_of),
                        flat_since: None,
                        last_buy_at: Some(context.as_of),
                        last_sell_at: entry.as_ref().and_then(|p| p.last_sell_at),
                    },
                );
            }
            Side::Sell => {
                cash += gross_value - cost;
                if let Some(existing) = positions.get(&step.symbol).cloned() {
                    let new_quantity = existing.quantity - step.quantity;
                    positions.insert(
                        step.symbol.clone(),
                        Position {
                            symbol: step.symbol.clone(),
                            quantity: new_quantity,
                            avg_price: existing.avg_price,
                            current_price: Eur(execution_price),
                            opened_at: existing.opened_at,
                            flat_since: if new_quantity == 0 { Some(context.as_of) } else { None },
                            last_buy_at: existing.last_buy_at,
                            last_sell_at: Some(context.as_of),
                        },
                    );
                }
            }
        }
        if cash < 0.0 {
            feasible = false;
        }
    }

    SimulatedState {
        positions,
        cash,
        total_cost,
        feasible,
    }
}

fn apply_state(before: &PortfolioContext, state: &SimulatedState) -> PortfolioContext {
    PortfolioContext {
        as_of: before.as_of,
        cash: Eur(state.cash),
        positions: state.positions.clone(),
        securities: before.securities.clone(),
        country_targets: before.country_targets.clone(),
        industry_targets: before.industry_targets.clone(),
        quality_scores: before.quality_scores.clone(),
        dividend_yields: before.dividend_yields.clone(),
        trailing_cagr: before.trailing_cagr.clone(),
        risk_scores: before.risk_scores.clone(),
    }
}

/// Country gap (40%) + industry gap (30%) + averaging-down quality (30%)
/// (spec §4.4 step 2).
fn diversification_score(before: &PortfolioContext, after: &PortfolioContext, sequence: &Sequence) -> f64 {
    let country_gap_score = group_gap_score(before, after, |context, group| context.country_weight(group), &before.country_targets);
    let industry_gap_score = group_gap_score(before, after, |context, group| context.industry_weight(group), &before.industry_targets);
    let averaging_score = averaging_down_quality(after, sequence);
    W_COUNTRY_GAP * country_gap_score + W_INDUSTRY_GAP * industry_gap_score + W_AVERAGING_QUALITY * averaging_score
}

fn group_gap_score(
    before: &PortfolioContext,
    after: &PortfolioContext,
    weight_of: impl Fn(&PortfolioContext, &GroupKey) -> f64,
    targets: &SortedVecMap<GroupKey, f64>,
) -> f64 {
    if targets.is_empty() {
        return 0.5;
    }
    let gap_before: f64 = targets.iter().map(|(group, target)| (weight_of(before, group) - target).abs()).sum();
    let gap_after: f64 = targets.iter().map(|(group, target)| (weight_of(after, group) - target).abs()).sum();
    if gap_before <= 1e-9 {
        return if gap_after <= 1e-9 { 1.0 } else { 0.0 };
    }
    (1.0 - gap_after / gap_before).clamp(0.0, 1.0)
}

/// Rewards buying a held, quality dip — a BUY step on a symbol whose
/// average cost exceeds its execution price, weighted by the context's
/// quality score for that symbol. Neutral when the sequence has no such
/// step.
fn averaging_down_quality(after: &PortfolioContext, sequence: &Sequence) -> f64 {
    let dip_buys: Vec<f64> = sequence
        .steps()
        .iter()
        .filter(|step| step.side == Side::Buy)
        .filter_map(|step| {
            let position = after.positions.get(&step.symbol)?;
            if position.avg_price.0 > 0.0 && step.unit_price.0 < position.avg_price.0 {
                Some(after.quality_score(&step.symbol))
            } else {
                None
            }
        })
        .collect();
    if dip_buys.is_empty() {
        0.5
    } else {
        dip_buys.iter().sum::<f64>() / dip_buys.len() as f64
    }
}

/// Value-weighted average of the context's pre-aggregated stability scores
/// across held positions (spec §4.4 step 3 "stability").
fn stability_score(context: &PortfolioContext) -> f64 {
    weighted_average(context, |ctx, symbol| ctx.risk_score(symbol))
}

fn quality_score(context: &PortfolioContext) -> f64 {
    weighted_average(context, |ctx, symbol| ctx.quality_score(symbol))
}

fn dividend_score(context: &PortfolioContext) -> f64 {
    weighted_average(context, |ctx, symbol| (ctx.dividend_yield(symbol) / 0.06).clamp(0.0, 1.0))
}

fn growth_score(context: &PortfolioContext) -> f64 {
    weighted_average(context, |ctx, symbol| {
        ctx.trailing_cagr(symbol).map(|cagr| ((cagr + 0.10) / 0.30).clamp(0.0, 1.0)).unwrap_or(0.5)
    })
}

fn weighted_average(context: &PortfolioContext, metric: impl Fn(&PortfolioContext, &Symbol) -> f64) -> f64 {
    let total_value = context.total_value().0;
    if total_value <= 0.0 || context.positions.is_empty() {
        return 0.5;
    }
    context
        .positions
        .iter()
        .map(|(symbol, position)| metric(context, symbol) * position.market_value().0 / total_value)
        .sum()
}

/// Per-symbol Monte Carlo price factors for one path (spec §4.4): `pᵢ ←
/// pᵢ · exp(σᵢ/√252 · Zᵢ)`, clamped to `[0.5, 2.0]`.
fn monte_carlo_factors(sequence: &Sequence, settings: &EvaluationSettings, rng: &mut StdRng) -> SortedVecMap<Symbol, f64> {
    let mut factors = SortedVecMap::new();
    for step in sequence.steps() {
        if factors.get(&step.symbol).is_some() {
            continue;
        }
        let sigma = settings.volatilities.get(&step.symbol).copied().unwrap_or(settings.default_volatility);
        let z: f64 = StandardNormal.sample(rng);
        let factor = (sigma / TRADING_DAYS_PER_YEAR.sqrt() * z).exp();
        let clamped = factor.clamp(MONTE_CARLO_FACTOR_CLAMP.0, MONTE_CARLO_FACTOR_CLAMP.1);
        factors.insert(step.symbol.clone(), clamped);
    }
    factors
}

/// Blends per-path/per-shift scores into one result: `weight_worst · worst +
/// weight_mean · mean [+ weight_p10 · p10]` (spec §4.4 stochastic / Monte
/// Carlo formulas).
fn blend_scenarios(sequence: &Sequence, scored: &[EvaluationResult], weight_worst: f64, weight_mean: f64, weight_p10: Option<f64>) -> EvaluationResult {
    if scored.is_empty() {
        return EvaluationResult::infeasible(sequence.clone(), "no scenario paths evaluated");
    }
    if scored.iter().all(|result| !result.feasible) {
        return scored[0].clone();
    }
    let feasible: Vec<&EvaluationResult> = scored.iter().filter(|r| r.feasible).collect();

    let mut totals: Vec<f64> = feasible.iter().map(|r| r.total_score).collect();
    totals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let worst = totals.first().copied().unwrap_or(0.0);
    let mean = totals.iter().sum::<f64>() / totals.len() as f64;

    let blended_total = match weight_p10 {
        Some(weight_p10) => {
            let p10_index = ((totals.len() as f64 - 1.0) * 0.10).round() as usize;
            let p10 = totals[p10_index.min(totals.len() - 1)];
            weight_worst * worst + weight_p10 * p10 + weight_mean * mean
        }
        None => weight_worst * worst + weight_mean * mean,
    };

    let average = |pick: fn(&EvaluationResult) -> f64| feasible.iter().map(|r| pick(r)).sum::<f64>() / feasible.len() as f64;

    EvaluationResult {
        sequence: sequence.clone(),
        end_state_score: blended_total,
        diversification_score: average(|r| r.diversification_score),
        risk_score: average(|r| r.risk_score),
        total_score: blended_total,
        total_cost: Eur(average(|r| r.total_cost.0)),
        cash_required: Eur(average(|r| r.cash_required.0)),
        feasible: true,
        metrics: feasible[0].metrics.clone(),
        reason: None,
    }
}

fn top_k_by_score(mut results: Vec<EvaluationResult>, beam_width: usize) -> Vec<EvaluationResult> {
    results.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(Ordering::Equal));
    results.truncate(beam_width.max(1));
    results
}

/// Maintains a Pareto front on `(end-state, diversification, -risk, -cost)`;
/// dominated entries are evicted. Falls back to top-`beam_width` by
/// end-state when the front itself exceeds `beam_width` (spec §4.4).
fn pareto_front(results: Vec<EvaluationResult>, beam_width: usize) -> Vec<EvaluationResult> {
    let mut front: Vec<EvaluationResult> = Vec::new();
    for candidate in results {
        if front.iter().any(|existing| existing.dominates(&candidate)) {
            continue;
        }
        front.retain(|existing| !candidate.dominates(existing));
        front.push(candidate);
    }
    if front.len() > beam_width {
        return top_k_by_score(front, beam_width);
    }
    front.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(Ordering::Equal));
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionCandidate, Eur};

    fn sample_context() -> PortfolioContext {
        let mut context = PortfolioContext {
            as_of: chrono::Utc::now(),
            cash: Eur(2_000.0),
            ..Default::default()
        };
        context.positions.insert(
            Symbol::from("AAPL"),
            Position {
                symbol: Symbol::from("AAPL"),
                quantity: 20,
                avg_price: Eur(100.0),
                current_price: Eur(150.0),
                opened_at: context.as_of - chrono::Duration::days(200),
                flat_since: None,
                last_buy_at: None,
                last_sell_at: None,
            },
        );
        context.quality_scores.insert(Symbol::from("AAPL"), 0.85);
        context
    }

    #[test]
    fn deterministic_evaluation_ranks_feasible_sequences_above_infeasible() {
        let evaluator = SequenceEvaluator::new();
        let context = sample_context();
        let feasible = Sequence::try_new(vec![ActionCandidate::new(Side::Buy, "SAP", 5, Eur(100.0))]).unwrap();
        let infeasible = Sequence::try_new(vec![ActionCandidate::new(Side::Buy, "SAP", 10_000, Eur(1_000.0))]).unwrap();
        let settings = EvaluationSettings::default();
        let results = evaluator.evaluate(&[feasible, infeasible], &context, &settings);
        assert!(results[0].feasible);
        assert!(results[0].total_score >= results.last().unwrap().total_score);
    }

    #[test]
    fn beam_width_is_respected() {
        let evaluator = SequenceEvaluator::new();
        let context = sample_context();
        let sequences: Vec<Sequence> = (0..20)
            .map(|i| Sequence::try_new(vec![ActionCandidate::new(Side::Buy, format!("SYM{i}"), 1, Eur(10.0))]).unwrap())
            .collect();
        let settings = EvaluationSettings {
            beam_width: 5,
            ..EvaluationSettings::default()
        };
        let results = evaluator.evaluate(&sequences, &context, &settings);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn results_are_sorted_descending_by_score() {
        let evaluator = SequenceEvaluator::new();
        let context = sample_context();
        let sequences: Vec<Sequence> = (0..5)
            .map(|i| Sequence::try_new(vec![ActionCandidate::new(Side::Buy, format!("SYM{i}"), 1, Eur(10.0))]).unwrap())
            .collect();
        let settings = EvaluationSettings::default();
        let results = evaluator.evaluate(&sequences, &context, &settings);
        for pair in results.windows(2) {
            assert!(pair[0].total_score >= pair[1].total_score);
        }
    }

    #[test]
    fn monte_carlo_mode_produces_a_feasible_blended_result() {
        let evaluator = SequenceEvaluator::new();
        let context = sample_context();
        let sequence = Sequence::try_new(vec![ActionCandidate::new(Side::Buy, "SAP", 5, Eur(100.0))]).unwrap();
        let settings = EvaluationSettings {
            scenario: ScenarioMode::monte_carlo_default(42),
            ..EvaluationSettings::default()
        };
        let results = evaluator.evaluate(&[sequence], &context, &settings);
        assert_eq!(results.len(), 1);
        assert!(results[0].feasible);
    }

    #[test]
    fn pareto_front_falls_back_to_top_k_when_too_large() {
        let evaluator = SequenceEvaluator::new();
        let context = sample_context();
        let sequences: Vec<Sequence> = (0..10)
            .map(|i| Sequence::try_new(vec![ActionCandidate::new(Side::Buy, format!("SYM{i}"), 1, Eur(10.0 + i as f64))]).unwrap())
            .collect();
        let settings = EvaluationSettings {
            beam_mode: BeamMode::ParetoFront,
            beam_width: 3,
            ..EvaluationSettings::default()
        };
        let results = evaluator.evaluate(&sequences, &context, &settings);
        assert!(results.len() <= 3);
    }
}
