//! The Sequence Generator (C2): combines the five categorised opportunity
//! lists into feasible ordered [`Sequence`]s, streamed in fixed-size batches
//! (spec §4.3). Grounded on the original system's `sequence_generator.py`
//! and its pluggable `pattern_generators/*.py`.

pub mod combinatorial;
pub mod filters;
pub mod patterns;

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::config::PlannerConfig;
use crate::model::{PortfolioContext, Sequence, Side, Symbol};
use crate::opportunity::CategorisedCandidates;

pub use combinatorial::{CombinatorialSettings, PARTIAL_MULTIPLIERS};
pub use patterns::{PatternParams, PatternRegistry, SequencePattern};

/// One streamed unit of generator output (spec §4.3, §6 `SequenceBatch`).
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    pub batch_number: u64,
    pub sequences: Vec<Sequence>,
    pub more_available: bool,
}

/// Settings the generator needs beyond the opportunity lists themselves
/// (spec §6 `GenerateSequences` request): combinatorial bounds, batching,
/// filter toggles, and which named patterns to run.
pub struct GeneratorSettings<'a> {
    pub combinatorial: CombinatorialSettings,
    pub batch_size: usize,
    pub diversity_weight: f64,
    pub enable_correlation_aware: bool,
    pub same_side_cooloff_days: i64,
    pub pattern_names: &'a [&'a str],
}

/// The thirteen pattern names of spec §4.3, in registration order.
pub const DEFAULT_PATTERN_NAMES: [&str; 13] = [
    "direct_buy",
    "profit_taking",
    "rebalance",
    "averaging_down",
    "single_best",
    "multi_sell",
    "mixed_strategy",
    "opportunity_first",
    "deep_rebalance",
    "cash_generation",
    "cost_optimized",
    "adaptive",
    "market_regime",
];

impl<'a> GeneratorSettings<'a> {
    pub fn from_config(config: &PlannerConfig, available_cash: f64, pattern_names: &'a [&'a str]) -> Self {
        Self {
            combinatorial: CombinatorialSettings::from_config(config, available_cash),
            batch_size: config.batch_size,
            diversity_weight: config.diversity_weight,
            enable_correlation_aware: config.enable_correlation_aware,
            same_side_cooloff_days: 1,
            pattern_names,
        }
    }
}

/// Every input the pattern/filter pipeline reads beyond the opportunity
/// pool and settings: pairwise correlations for `correlation_aware`, and
/// recent same-side trade ages for `recently_traded`. Both are optional
/// lookups the caller may have nothing for, in which case the filters are
/// no-ops.
#[derive(Debug, Clone, Default)]
pub struct GeneratorContext {
    pub correlations: Vec<(Symbol, Symbol, f64)>,
    pub last_traded_days_ago: HashMap<(Symbol, Side), i64>,
}

/// Generates every feasible sequence up front (deterministic order, spec §8
/// invariant 5), then exposes it as fixed-size batches — satisfying the
/// "streaming" contract of spec §4.3 without a background task, since
/// sequence generation here is pure CPU work over an in-memory pool.
pub struct SequenceGenerator {
    registry: PatternRegistry,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self {
            registry: PatternRegistry::with_defaults(),
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    #[instrument(skip_all, fields(opportunities = opportunities.total_count()))]
    pub fn generate(
        &self,
        opportunities: &CategorisedCandidates,
        context: &PortfolioContext,
        settings: &GeneratorSettings<'_>,
        generator_context: &GeneratorContext,
    ) -> Vec<SequenceBatch> {
        let mut sequences = self.enumerate_all(opportunities, context, settings);

        sequences = filters::recently_traded(
            sequences,
            &generator_context.last_traded_days_ago,
            settings.same_side_cooloff_days,
        );
        if settings.enable_correlation_aware {
            sequences = filters::correlation_aware(sequences, &generator_context.correlations);
        }
        sequences = filters::diversity_prune(sequences, settings.diversity_weight);

        let batches = self.into_batches(sequences, settings.batch_size);
        debug!(batches = batches.len(), "sequence batches generated");
        batches
    }

    /// Runs every registered pattern plus the combinatorial generator over
    /// the same candidate pool, falling back to a relaxed priority
    /// threshold when nothing survives (spec §4.3's "constraint-relaxation
    /// generator").
    fn enumerate_all(
        &self,
        opportunities: &CategorisedCandidates,
        context: &PortfolioContext,
        settings: &GeneratorSettings<'_>,
    ) -> Vec<Sequence> {
        let params = PatternParams::default();
        let mut sequences = self.run_patterns(opportunities, context, settings.pattern_names, &params);

        sequences.extend(combinatorial::enumerate_combinations(
            opportunities,
            context,
            &settings.combinatorial,
        ));

        if sequences.is_empty() {
            debug!("unrelaxed pool empty, retrying patterns with a relaxed priority threshold");
            let relaxed = PatternParams {
                min_priority: 0.0,
                ..params
            };
            sequences = self.run_patterns(opportunities, context, settings.pattern_names, &relaxed);
        }

        sequences
    }

    fn run_patterns(
        &self,
        opportunities: &CategorisedCandidates,
        context: &PortfolioContext,
        pattern_names: &[&str],
        params: &PatternParams,
    ) -> Vec<Sequence> {
        let mut sequences = Vec::new();
        for name in pattern_names {
            if let Some(pattern) = self.registry.get(name) {
                sequences.extend(pattern.generate(opportunities, context, params));
            }
        }
        sequences
    }

    fn into_batches(&self, sequences: Vec<Sequence>, batch_size: usize) -> Vec<SequenceBatch> {
        if sequences.is_empty() {
            return vec![SequenceBatch {
                batch_number: 0,
                sequences: Vec::new(),
                more_available: false,
            }];
        }
        let batch_size = batch_size.max(1);
        let total = sequences.len();
        sequences
            .chunks(batch_size)
            .enumerate()
            .map(|(batch_number, chunk)| {
                let consumed = (batch_number + 1) * batch_size;
                SequenceBatch {
                    batch_number: batch_number as u64,
                    sequences: chunk.to_vec(),
                    more_available: consumed < total,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::model::{ActionCandidate, Eur};

    fn sample_opportunities() -> CategorisedCandidates {
        let mut opportunities = CategorisedCandidates::default();
        let mut buy = ActionCandidate::new(Side::Buy, "SAP", 10, Eur(120.0));
        buy.priority = 0.8;
        opportunities.rebalance_buys.push(buy);
        opportunities
    }

    #[test]
    fn generate_produces_at_least_one_batch() {
        let generator = SequenceGenerator::new();
        let config = PlannerConfig::default();
        let context = PortfolioContext {
            cash: Eur(10_000.0),
            as_of: chrono::Utc::now(),
            ..Default::default()
        };
        let opportunities = sample_opportunities();
        let settings = GeneratorSettings::from_config(&config, context.cash.0, &DEFAULT_PATTERN_NAMES);
        let batches = generator.generate(&opportunities, &context, &settings, &GeneratorContext::default());
        assert!(!batches.is_empty());
        assert!(batches.iter().map(|b| b.sequences.len()).sum::<usize>() > 0);
    }

    #[test]
    fn empty_opportunity_pool_yields_a_single_empty_batch() {
        let generator = SequenceGenerator::new();
        let config = PlannerConfig::default();
        let context = PortfolioContext::default();
        let opportunities = CategorisedCandidates::default();
        let settings = GeneratorSettings::from_config(&config, 0.0, &DEFAULT_PATTERN_NAMES);
        let batches = generator.generate(&opportunities, &context, &settings, &GeneratorContext::default());
        assert_eq!(batches.len(), 1);
        assert!(batches[0].sequences.is_empty());
        assert!(!batches[0].more_available);
    }

    #[test]
    fn batching_respects_the_configured_batch_size() {
        let generator = SequenceGenerator::new();
        let mut config = PlannerConfig::default();
        config.batch_size = 1;
        let context = PortfolioContext {
            cash: Eur(10_000.0),
            as_of: chrono::Utc::now(),
            ..Default::default()
        };
        let mut opportunities = CategorisedCandidates::default();
        for (symbol, priority) in [("A", 0.9), ("B", 0.8)] {
            let mut buy = ActionCandidate::new(Side::Buy, symbol, 10, Eur(50.0));
            buy.priority = priority;
            opportunities.rebalance_buys.push(buy);
        }
        let settings = GeneratorSettings::from_config(&config, context.cash.0, &DEFAULT_PATTERN_NAMES);
        let batches = generator.generate(&opportunities, &context, &settings, &GeneratorContext::default());
        assert!(batches.iter().all(|b| b.sequences.len() <= 1));
        if batches.len() > 1 {
            assert!(batches[0].more_available);
        }
    }
}
