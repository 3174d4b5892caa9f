use crate::config::{PlannerConfig, MAX_CONCENTRATION};
use crate::model::{ActionCandidate, Eur, PortfolioContext, Sequence, Side};
use crate::opportunity::CategorisedCandidates;

/// Settings the combinatorial generator needs beyond the opportunity lists
/// themselves (spec §4.3 "Combinatorial generator").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CombinatorialSettings {
    pub max_depth: usize,
    pub max_combinations: usize,
    pub available_cash: f64,
    pub transaction_fee_fixed: f64,
    pub transaction_fee_percent: f64,
}

impl CombinatorialSettings {
    pub fn from_config(config: &PlannerConfig, available_cash: f64) -> Self {
        Self {
            max_depth: config.max_depth,
            max_combinations: config.max_combinations,
            available_cash,
            transaction_fee_fixed: config.transaction_fee_fixed,
            transaction_fee_percent: config.transaction_fee_percent,
        }
    }

    fn cost_of(&self, value: f64) -> f64 {
        self.transaction_fee_fixed + value * self.transaction_fee_percent
    }
}

/// Enumerates mixed sell-then-buy sequences up to `max_depth`, deterministic
/// given the same candidate pool (spec §8 invariant 5). Sells are tried
/// first in the fixed iteration order so that deeper sequences see the cash
/// freed by any preceding sell, matching the `is_cash_feasible` convention
/// sells-before-buys assumes.
///
/// Pruning applied during enumeration, in order (spec §4.3):
/// 1. Cash-path feasibility.
/// 2. Concentration pre-check against [`MAX_CONCENTRATION`].
/// 3. The `max_combinations` cap is applied here, *before* diversity
///    filtering (spec §9 open question: this spec fixes that ordering).
pub fn enumerate_combinations(
    opportunities: &CategorisedCandidates,
    context: &PortfolioContext,
    settings: &CombinatorialSettings,
) -> Vec<Sequence> {
    let mut pool: Vec<ActionCandidate> = Vec::new();
    pool.extend(opportunities.rebalance_sells.iter().cloned());
    pool.extend(opportunities.profit_taking.iter().cloned());
    pool.extend(opportunities.rebalance_buys.iter().cloned());
    pool.extend(opportunities.averaging_down.iter().cloned());
    pool.extend(opportunities.opportunity_buys.iter().cloned());
    // Deterministic order: sells before buys, then by symbol — the pool's
    // construction order above (sells first) plus a stable sort keeps the
    // enumeration byte-identical across runs given the same input.
    pool.sort_by(|a, b| (sell_rank(a), &a.symbol).cmp(&(sell_rank(b), &b.symbol)));

    let mut accepted = Vec::new();
    let mut path = Vec::new();
    let mut used = std::collections::BTreeSet::new();
    enumerate_depth(
        &pool,
        context,
        settings,
        &mut path,
        &mut used,
        &mut accepted,
    );
    accepted
}

fn sell_rank(candidate: &ActionCandidate) -> u8 {
    match candidate.side {
        Side::Sell => 0,
        Side::Buy => 1,
    }
}

fn enumerate_depth(
    pool: &[ActionCandidate],
    context: &PortfolioContext,
    settings: &CombinatorialSettings,
    path: &mut Vec<ActionCandidate>,
    used: &mut std::collections::BTreeSet<crate::model::Symbol>,
    accepted: &mut Vec<Sequence>,
) {
    if accepted.len() >= settings.max_combinations {
        return;
    }
    if !path.is_empty() {
        if let Ok(sequence) = Sequence::try_new(path.clone()) {
            accepted.push(sequence);
            if accepted.len() >= settings.max_combinations {
                return;
            }
        }
    }
    if path.len() >= settings.max_depth {
        return;
    }

    for candidate in pool {
        if used.contains(&candidate.symbol) {
            continue;
        }
        if accepted.len() >= settings.max_combinations {
            return;
        }
        path.push(candidate.clone());
        let cash_ok = is_cash_feasible(path, settings);
        let concentration_ok = respects_concentration(path, context);
        if cash_ok && concentration_ok {
            used.insert(candidate.symbol.clone());
            enumerate_depth(pool, context, settings, path, used, accepted);
            used.remove(&candidate.symbol);
        }
        path.pop();
    }
}

fn is_cash_feasible(path: &[ActionCandidate], settings: &CombinatorialSettings) -> bool {
    let mut balance = settings.available_cash;
    for action in path {
        let cost = settings.cost_of(action.value.0);
        balance += action.signed_cash_delta().0;
        balance -= cost;
        if balance < 0.0 {
            return false;
        }
    }
    true
}

fn respects_concentration(path: &[ActionCandidate], context: &PortfolioContext) -> bool {
    let total_value = context.total_value().0;
    if total_value <= 0.0 {
        return true;
    }
    let mut simulated_value: std::collections::BTreeMap<crate::model::Symbol, f64> =
        std::collections::BTreeMap::new();
    for (symbol, position) in context.positions.iter() {
        simulated_value.insert(symbol.clone(), position.market_value().0);
    }
    for action in path {
        let entry = simulated_value.entry(action.symbol.clone()).or_insert(0.0);
        match action.side {
            Side::Buy => *entry += action.value.0,
            Side::Sell => *entry -= action.value.0,
        }
        let weight = *entry / total_value;
        if weight > MAX_CONCENTRATION + 1e-9 {
            return false;
        }
    }
    true
}

/// Partial-execution generator (spec §4.3): re-expresses each buy candidate
/// at the given quantity multiplier, preserving feasibility checks
/// upstream — this only reshapes the candidate, it doesn't re-validate cash.
pub fn expand_partial_quantities(candidate: &ActionCandidate, multipliers: &[f64]) -> Vec<ActionCandidate> {
    multipliers
        .iter()
        .filter_map(|&multiplier| {
            let quantity = ((candidate.quantity as f64) * multiplier).floor() as i64;
            if quantity <= 0 {
                return None;
            }
            let mut partial = ActionCandidate::new(candidate.side, candidate.symbol.clone(), quantity, candidate.unit_price);
            partial.priority = candidate.priority;
            partial.reason = candidate.reason.clone();
            partial.tags = candidate.tags.clone();
            partial = partial.with_tag("partial");
            Some(partial)
        })
        .collect()
}

pub const PARTIAL_MULTIPLIERS: [f64; 4] = [0.25, 0.50, 0.75, 1.00];

pub fn cash_feasible(sequence: &Sequence, available_cash: Eur, settings: &CombinatorialSettings) -> bool {
    let mut balance = available_cash.0;
    for action in sequence.steps() {
        let cost = settings.cost_of(action.value.0);
        balance += action.signed_cash_delta().0;
        balance -= cost;
        if balance < 0.0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eur, Position, Security, Symbol};

    fn sample_context() -> PortfolioContext {
        let mut context = PortfolioContext {
            as_of: chrono::Utc::now(),
            cash: Eur(5_000.0),
            ..Default::default()
        };
        context.positions.insert(
            Symbol::from("AAPL"),
            Position {
                symbol: Symbol::from("AAPL"),
                quantity: 20,
                avg_price: Eur(100.0),
                current_price: Eur(150.0),
                opened_at: chrono::Utc::now(),
                flat_since: None,
                last_buy_at: None,
                last_sell_at: None,
            },
        );
        context.securities.insert(Symbol::from("AAPL"), Security::new("AAPL", "Apple", Eur(150.0)));
        context.securities.insert(Symbol::from("SAP"), Security::new("SAP", "SAP SE", Eur(150.0)));
        context
    }

    #[test]
    fn enumeration_is_deterministic() {
        let context = sample_context();
        let settings = CombinatorialSettings {
            max_depth: 2,
            max_combinations: 100,
            available_cash: 5_000.0,
            transaction_fee_fixed: 1.0,
            transaction_fee_percent: 0.001,
        };
        let mut opportunities = CategorisedCandidates::default();
        opportunities
            .rebalance_buys
            .push(ActionCandidate::new(Side::Buy, "SAP", 10, Eur(150.0)));
        opportunities
            .rebalance_sells
            .push(ActionCandidate::new(Side::Sell, "AAPL", 5, Eur(150.0)));

        let first = enumerate_combinations(&opportunities, &context, &settings);
        let second = enumerate_combinations(&opportunities, &context, &settings);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn max_depth_one_yields_only_single_step_sequences() {
        let context = sample_context();
        let settings = CombinatorialSettings {
            max_depth: 1,
            max_combinations: 100,
            available_cash: 5_000.0,
            transaction_fee_fixed: 1.0,
            transaction_fee_percent: 0.001,
        };
        let mut opportunities = CategorisedCandidates::default();
        opportunities
            .rebalance_buys
            .push(ActionCandidate::new(Side::Buy, "SAP", 10, Eur(150.0)));
        opportunities
            .rebalance_sells
            .push(ActionCandidate::new(Side::Sell, "AAPL", 5, Eur(150.0)));

        let sequences = enumerate_combinations(&opportunities, &context, &settings);
        assert!(sequences.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn negative_cash_path_is_pruned() {
        let context = sample_context();
        let settings = CombinatorialSettings {
            max_depth: 1,
            max_combinations: 100,
            available_cash: 10.0,
            transaction_fee_fixed: 1.0,
            transaction_fee_percent: 0.001,
        };
        let mut opportunities = CategorisedCandidates::default();
        opportunities
            .rebalance_buys
            .push(ActionCandidate::new(Side::Buy, "SAP", 100, Eur(150.0)));

        let sequences = enumerate_combinations(&opportunities, &context, &settings);
        assert!(sequences.is_empty());
    }

    #[test]
    fn partial_quantities_never_produce_zero() {
        let candidate = ActionCandidate::new(Side::Buy, "SAP", 1, Eur(150.0));
        let expanded = expand_partial_quantities(&candidate, &PARTIAL_MULTIPLIERS);
        assert!(expanded.iter().all(|c| c.quantity > 0));
    }
}
