//! The thirteen named pattern generators of spec §4.3, each a capability
//! value registered by name rather than looked up via runtime reflection
//! (spec §9's redesign flag against "dynamic pattern/filter registries by
//! string name"). Grounded on the original system's
//! `pattern_generators/*.py` family.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{ActionCandidate, PortfolioContext, Sequence};

use crate::opportunity::CategorisedCandidates;

/// Parameters a pattern may read to relax its own thresholds (spec §4.3
/// "constraint-relaxation generator": patterns are retried with relaxed
/// priority thresholds when the unrelaxed pool is empty).
#[derive(Debug, Clone, Copy)]
pub struct PatternParams {
    pub min_priority: f64,
    pub max_sequences: usize,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            min_priority: 0.1,
            max_sequences: 50,
        }
    }
}

/// A named sequence-generation strategy (spec §4.3 "Pattern generators").
pub trait SequencePattern: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(
        &self,
        opportunities: &CategorisedCandidates,
        context: &PortfolioContext,
        params: &PatternParams,
    ) -> Vec<Sequence>;
}

/// A plain name-to-value registry (spec §9: no runtime attribute lookup on
/// types, just a map populated at startup).
pub struct PatternRegistry {
    patterns: HashMap<&'static str, Box<dyn SequencePattern>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    pub fn register(&mut self, pattern: Box<dyn SequencePattern>) {
        self.patterns.insert(pattern.name(), pattern);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SequencePattern> {
        self.patterns.get(name).map(|boxed| boxed.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.patterns.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The thirteen patterns of spec §4.3, registered by name.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DirectBuy));
        registry.register(Box::new(ProfitTaking));
        registry.register(Box::new(Rebalance));
        registry.register(Box::new(AveragingDown));
        registry.register(Box::new(SingleBest));
        registry.register(Box::new(MultiSell));
        registry.register(Box::new(MixedStrategy));
        registry.register(Box::new(OpportunityFirst));
        registry.register(Box::new(DeepRebalance));
        registry.register(Box::new(CashGeneration));
        registry.register(Box::new(CostOptimized));
        registry.register(Box::new(Adaptive));
        registry.register(Box::new(MarketRegime));
        registry
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn by_priority_desc(a: &ActionCandidate, b: &ActionCandidate) -> Ordering {
    b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal)
}

/// Builds single-action sequences from a candidate list, filtered by
/// `min_priority`, sorted best-first, capped at `max_sequences` — the shape
/// most single-stage patterns below share.
fn singles(candidates: &[ActionCandidate], params: &PatternParams) -> Vec<Sequence> {
    let mut sorted: Vec<&ActionCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.priority >= params.min_priority)
        .collect();
    sorted.sort_by(|a, b| by_priority_desc(a, b));
    sorted
        .into_iter()
        .take(params.max_sequences)
        .filter_map(|candidate| Sequence::try_new(vec![candidate.clone()]).ok())
        .collect()
}

/// One buy at a time, highest priority first.
struct DirectBuy;
impl SequencePattern for DirectBuy {
    fn name(&self) -> &'static str {
        "direct_buy"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut candidates = opportunities.rebalance_buys.clone();
        candidates.extend(opportunities.opportunity_buys.iter().cloned());
        singles(&candidates, params)
    }
}

/// One profit-taking sell at a time.
struct ProfitTaking;
impl SequencePattern for ProfitTaking {
    fn name(&self) -> &'static str {
        "profit_taking"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        singles(&opportunities.profit_taking, params)
    }
}

/// Paired rebalance sell then buy, sequenced sell-first so the buy's cash is
/// guaranteed available — the classic "trim overweight, fund underweight"
/// move.
struct Rebalance;
impl SequencePattern for Rebalance {
    fn name(&self) -> &'static str {
        "rebalance"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut sequences = Vec::new();
        let sells: Vec<&ActionCandidate> = opportunities
            .rebalance_sells
            .iter()
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        let buys: Vec<&ActionCandidate> = opportunities
            .rebalance_buys
            .iter()
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        for sell in &sells {
            for buy in &buys {
                if sell.symbol == buy.symbol {
                    continue;
                }
                if let Ok(seq) = Sequence::try_new(vec![(*sell).clone(), (*buy).clone()]) {
                    sequences.push(seq);
                }
                if sequences.len() >= params.max_sequences {
                    return sequences;
                }
            }
        }
        sequences
    }
}

/// One averaging-down buy at a time.
struct AveragingDown;
impl SequencePattern for AveragingDown {
    fn name(&self) -> &'static str {
        "averaging_down"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        singles(&opportunities.averaging_down, params)
    }
}

/// The single highest-priority candidate across every category — a
/// conservative one-action plan for a tight search budget.
struct SingleBest;
impl SequencePattern for SingleBest {
    fn name(&self) -> &'static str {
        "single_best"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        opportunities
            .all()
            .filter(|candidate| candidate.priority >= params.min_priority)
            .max_by(|a, b| by_priority_desc(b, a))
            .and_then(|candidate| Sequence::try_new(vec![candidate.clone()]).ok())
            .into_iter()
            .collect()
    }
}

/// Two sells chained together — profit-taking plus rebalance trims,
/// highest-priority first — raising cash without committing to a buy yet.
struct MultiSell;
impl SequencePattern for MultiSell {
    fn name(&self) -> &'static str {
        "multi_sell"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut sells: Vec<&ActionCandidate> = opportunities
            .profit_taking
            .iter()
            .chain(opportunities.rebalance_sells.iter())
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        sells.sort_by(|a, b| by_priority_desc(a, b));
        let mut sequences = Vec::new();
        for pair in sells.chunks(2) {
            if pair.len() < 2 {
                continue;
            }
            if let Ok(seq) = Sequence::try_new(pair.iter().map(|c| (*c).clone()).collect()) {
                sequences.push(seq);
            }
            if sequences.len() >= params.max_sequences {
                break;
            }
        }
        sequences
    }
}

/// One sell and one buy drawn from different categories than the dedicated
/// `rebalance` pattern — e.g. profit-taking funding an averaging-down add.
struct MixedStrategy;
impl SequencePattern for MixedStrategy {
    fn name(&self) -> &'static str {
        "mixed_strategy"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let sells: Vec<&ActionCandidate> = opportunities
            .profit_taking
            .iter()
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        let buys: Vec<&ActionCandidate> = opportunities
            .averaging_down
            .iter()
            .chain(opportunities.opportunity_buys.iter())
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        let mut sequences = Vec::new();
        for sell in &sells {
            for buy in &buys {
                if sell.symbol == buy.symbol {
                    continue;
                }
                if let Ok(seq) = Sequence::try_new(vec![(*sell).clone(), (*buy).clone()]) {
                    sequences.push(seq);
                }
                if sequences.len() >= params.max_sequences {
                    return sequences;
                }
            }
        }
        sequences
    }
}

/// Opportunity buys ranked ahead of rebalance buys — for a cash-rich
/// portfolio where chasing high-conviction ideas outweighs strict
/// target-weight tracking.
struct OpportunityFirst;
impl SequencePattern for OpportunityFirst {
    fn name(&self) -> &'static str {
        "opportunity_first"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        singles(&opportunities.opportunity_buys, params)
    }
}

/// Up to two rebalance sells chained with up to two rebalance buys, capped
/// at three total steps — a heavier reshuffle than the two-step `rebalance`
/// pattern covers.
struct DeepRebalance;
impl SequencePattern for DeepRebalance {
    fn name(&self) -> &'static str {
        "deep_rebalance"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut sells: Vec<&ActionCandidate> = opportunities
            .rebalance_sells
            .iter()
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        sells.sort_by(|a, b| by_priority_desc(a, b));
        let mut buys: Vec<&ActionCandidate> = opportunities
            .rebalance_buys
            .iter()
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        buys.sort_by(|a, b| by_priority_desc(a, b));

        let mut sequences = Vec::new();
        for sell_count in 1..=sells.len().min(2) {
            for buy_count in 1..=buys.len().min(2) {
                if sell_count + buy_count > 3 {
                    continue;
                }
                let mut steps: Vec<ActionCandidate> = sells[..sell_count].iter().map(|c| (*c).clone()).collect();
                steps.extend(buys[..buy_count].iter().map(|c| (*c).clone()));
                if let Ok(seq) = Sequence::try_new(steps) {
                    sequences.push(seq);
                }
                if sequences.len() >= params.max_sequences {
                    return sequences;
                }
            }
        }
        sequences
    }
}

/// Sell-only sequences ranked by raised value, highest first — for raising
/// cash without committing to a specific reinvestment yet.
struct CashGeneration;
impl SequencePattern for CashGeneration {
    fn name(&self) -> &'static str {
        "cash_generation"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut sells: Vec<&ActionCandidate> = opportunities
            .profit_taking
            .iter()
            .chain(opportunities.rebalance_sells.iter())
            .filter(|c| c.priority >= params.min_priority)
            .collect();
        sells.sort_by(|a, b| b.value.0.partial_cmp(&a.value.0).unwrap_or(Ordering::Equal));
        sells
            .into_iter()
            .take(params.max_sequences)
            .filter_map(|candidate| Sequence::try_new(vec![candidate.clone()]).ok())
            .collect()
    }
}

/// Highest-value-first single buys, minimising the fixed per-trade cost's
/// share of the trade, for cost-sensitive requests.
struct CostOptimized;
impl SequencePattern for CostOptimized {
    fn name(&self) -> &'static str {
        "cost_optimized"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let mut buys: Vec<&ActionCandidate> = opportunities
            .rebalance_buys
            .iter()
            .chain(opportunities.opportunity_buys.iter())
            .filter(|c| c.priority >= params.min_priority && c.value.0 > 0.0)
            .collect();
        buys.sort_by(|a, b| b.value.0.partial_cmp(&a.value.0).unwrap_or(Ordering::Equal));
        buys.into_iter()
            .take(params.max_sequences)
            .filter_map(|candidate| Sequence::try_new(vec![candidate.clone()]).ok())
            .collect()
    }
}

/// Blends whichever categories currently hold candidates, widening the
/// per-pattern cap when the overall pool is thin — the generator's
/// catch-all for portfolios that don't fit a single named strategy well.
struct Adaptive;
impl SequencePattern for Adaptive {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, _context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let total = opportunities.total_count();
        let widened = PatternParams {
            min_priority: params.min_priority,
            max_sequences: if total < 5 {
                params.max_sequences * 2
            } else {
                params.max_sequences
            },
        };
        let mut candidates: Vec<ActionCandidate> = opportunities.all().cloned().collect();
        candidates.sort_by(|a, b| by_priority_desc(a, b));
        singles(&candidates, &widened)
    }
}

/// Favours defensive (sell-heavy) sequences when most held positions carry
/// unrealised losses, and growth (buy-heavy) sequences otherwise — a coarse
/// read of "market regime" off the portfolio's own P&L, since live
/// market-data ingestion is out of scope (spec §1 non-goals).
struct MarketRegime;
impl SequencePattern for MarketRegime {
    fn name(&self) -> &'static str {
        "market_regime"
    }

    fn generate(&self, opportunities: &CategorisedCandidates, context: &PortfolioContext, params: &PatternParams) -> Vec<Sequence> {
        let losing = context
            .positions
            .values()
            .filter(|position| position.unrealized_return().is_some_and(|r| r < 0.0))
            .count();
        let total_positions = context.positions.len().max(1);
        let defensive = losing as f64 / total_positions as f64 > 0.5;
        if defensive {
            let mut sequences = singles(&opportunities.profit_taking, params);
            sequences.extend(singles(&opportunities.rebalance_sells, params));
            sequences
        } else {
            let mut sequences = singles(&opportunities.rebalance_buys, params);
            sequences.extend(singles(&opportunities.opportunity_buys, params));
            sequences
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eur, Side};

    fn candidate(side: Side, symbol: &str, priority: f64) -> ActionCandidate {
        let mut candidate = ActionCandidate::new(side, symbol, 10, Eur(100.0));
        candidate.priority = priority;
        candidate
    }

    #[test]
    fn registry_resolves_every_documented_pattern_name() {
        let registry = PatternRegistry::with_defaults();
        for name in [
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
        ] {
            assert!(registry.get(name).is_some(), "missing pattern: {name}");
        }
        assert_eq!(registry.names().len(), 13);
    }

    #[test]
    fn direct_buy_orders_by_priority_descending() {
        let mut opportunities = CategorisedCandidates::default();
        opportunities.rebalance_buys.push(candidate(Side::Buy, "LOW", 0.2));
        opportunities.rebalance_buys.push(candidate(Side::Buy, "HIGH", 0.9));
        let pattern = DirectBuy;
        let context = PortfolioContext::default();
        let params = PatternParams::default();
        let sequences = pattern.generate(&opportunities, &context, &params);
        assert_eq!(sequences[0].steps()[0].symbol.0, "HIGH");
    }

    #[test]
    fn rebalance_pairs_distinct_symbols_only() {
        let mut opportunities = CategorisedCandidates::default();
        opportunities.rebalance_sells.push(candidate(Side::Sell, "ACME", 0.5));
        opportunities.rebalance_buys.push(candidate(Side::Buy, "ACME", 0.5));
        opportunities.rebalance_buys.push(candidate(Side::Buy, "OTHER", 0.5));
        let pattern = Rebalance;
        let context = PortfolioContext::default();
        let params = PatternParams::default();
        let sequences = pattern.generate(&opportunities, &context, &params);
        assert!(sequences.iter().all(|s| s.steps()[0].symbol != s.steps()[1].symbol));
    }

    #[test]
    fn single_best_picks_the_highest_priority_candidate_overall() {
        let mut opportunities = CategorisedCandidates::default();
        opportunities.profit_taking.push(candidate(Side::Sell, "A", 0.4));
        opportunities.opportunity_buys.push(candidate(Side::Buy, "B", 0.95));
        let pattern = SingleBest;
        let context = PortfolioContext::default();
        let params = PatternParams::default();
        let sequences = pattern.generate(&opportunities, &context, &params);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].steps()[0].symbol.0, "B");
    }
}
