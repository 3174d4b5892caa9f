//! The Opportunity Identifier (C1): turns a [`PortfolioContext`] plus
//! optional target weights into five categorised lists of candidate single
//! actions (spec §4.2). Grounded on the original system's
//! `opportunity_identifier.py`.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::{
    PlannerConfig, AVERAGING_DOWN_QUALITY_MIN, REBALANCE_GAP_THRESHOLD, WINDFALL_THRESHOLD,
};
use crate::model::{ActionCandidate, Eur, PortfolioContext, Side, Symbol};
use crate::safety::check_eligibility;
use crate::sorted_vec_map::SortedVecMap;

/// A discount below average cost that makes a held, high-quality position an
/// averaging-down candidate. The original system ties this to the same
/// "sufficiently below average cost" language spec §4.2 uses without a
/// number; 10% is the original's literal threshold.
pub const AVERAGING_DOWN_DISCOUNT: f64 = 0.10;

/// Five categorised candidate lists; any may be empty (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CategorisedCandidates {
    pub profit_taking: Vec<ActionCandidate>,
    pub averaging_down: Vec<ActionCandidate>,
    pub rebalance_sells: Vec<ActionCandidate>,
    pub rebalance_buys: Vec<ActionCandidate>,
    pub opportunity_buys: Vec<ActionCandidate>,
}

impl CategorisedCandidates {
    pub fn all(&self) -> impl Iterator<Item = &ActionCandidate> {
        self.profit_taking
            .iter()
            .chain(self.averaging_down.iter())
            .chain(self.rebalance_sells.iter())
            .chain(self.rebalance_buys.iter())
            .chain(self.opportunity_buys.iter())
    }

    pub fn total_count(&self) -> usize {
        self.profit_taking.len()
            + self.averaging_down.len()
            + self.rebalance_sells.len()
            + self.rebalance_buys.len()
            + self.opportunity_buys.len()
    }
}

/// Everything a single `identify` call needs (spec §6 `IdentifyOpportunities`).
pub struct OpportunityInput<'a> {
    pub context: &'a PortfolioContext,
    pub available_cash: Eur,
    pub target_weights: Option<&'a SortedVecMap<Symbol, f64>>,
    pub recently_sold: &'a [Symbol],
    pub ineligible_symbols: &'a [Symbol],
    pub as_of: DateTime<Utc>,
}

pub struct OpportunityIdentifier;

impl Default for OpportunityIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OpportunityIdentifier {
    pub fn new() -> Self {
        Self
    }

    /// Worthwhileness predicate of spec §4.2: `v >= 2*(c_fixed + v*c_pct)`,
    /// additionally floored by the configured `min_trade_value`.
    pub fn min_worthwhile_value(config: &PlannerConfig) -> f64 {
        let denom = (1.0 - 2.0 * config.transaction_fee_percent).max(1e-6);
        let threshold = 2.0 * config.transaction_fee_fixed / denom;
        threshold.max(config.min_trade_value)
    }

    pub fn is_worthwhile(value: f64, config: &PlannerConfig) -> bool {
        value >= Self::min_worthwhile_value(config)
    }

    #[instrument(skip_all, fields(positions = input.context.positions.len(), securities = input.context.securities.len()))]
    pub fn identify(&self, input: &OpportunityInput<'_>, config: &PlannerConfig) -> CategorisedCandidates {
        let mut result = CategorisedCandidates::default();

        result.profit_taking = self.profit_taking(input, config);
        result.averaging_down = self.averaging_down(input, config);
        result.rebalance_sells = self.rebalance_sells(input, config);
        result.rebalance_buys = self.rebalance_buys(input, config);
        result.opportunity_buys = self.opportunity_buys(input, config, &result);

        debug!(count = result.total_count(), "opportunities identified");
        result
    }

    fn is_ineligible_symbol(&self, symbol: &Symbol, input: &OpportunityInput<'_>) -> bool {
        input.ineligible_symbols.contains(symbol)
    }

    fn priority(
        &self,
        symbol: &Symbol,
        gap_magnitude: f64,
        input: &OpportunityInput<'_>,
    ) -> f64 {
        let quality = input.context.quality_score(symbol);
        let dividend_bonus = input.context.dividend_yield(symbol);
        let recency_penalty = if input.recently_sold.contains(symbol) { 0.5 } else { 0.0 };
        (quality * 0.4 + gap_magnitude.clamp(0.0, 1.0) * 0.3 + dividend_bonus * 0.2 - recency_penalty * 0.1)
            .max(0.0)
    }

    /// Integer share quantity for a trade of `target_value` at `price`,
    /// rounded down to the nearest multiple of `min_lot` and never zero
    /// unless `target_value` can't cover a single lot.
    fn lot_quantity(target_value: f64, price: f64, min_lot: i64) -> i64 {
        if price <= 0.0 || target_value <= 0.0 {
            return 0;
        }
        let raw_shares = (target_value / price).floor() as i64;
        let lot = min_lot.max(1);
        let lots = raw_shares / lot;
        lots * lot
    }

    fn check_sell_eligible(&self, candidate: &ActionCandidate, input: &OpportunityInput<'_>, config: &PlannerConfig) -> bool {
        if self.is_ineligible_symbol(&candidate.symbol, input) {
            return false;
        }
        let position = input.context.positions.get(&candidate.symbol);
        check_eligibility(candidate, position, config, input.as_of).is_ok()
    }

    fn check_buy_eligible(&self, candidate: &ActionCandidate, input: &OpportunityInput<'_>, config: &PlannerConfig) -> bool {
        if self.is_ineligible_symbol(&candidate.symbol, input) {
            return false;
        }
        let position = input.context.positions.get(&candidate.symbol);
        check_eligibility(candidate, position, config, input.as_of).is_ok()
    }

    fn profit_taking(&self, input: &OpportunityInput<'_>, _config: &PlannerConfig) -> Vec<ActionCandidate> {
        let mut candidates = Vec::new();
        for (symbol, position) in input.context.positions.iter() {
            if position.is_flat() {
                continue;
            }
            let Some(unrealized_return) = position.unrealized_return() else {
                continue;
            };
            let Some(trailing_cagr) = input.context.trailing_cagr(symbol) else {
                continue;
            };
            if unrealized_return < trailing_cagr + WINDFALL_THRESHOLD {
                continue;
            }
            let mut candidate = ActionCandidate::new(Side::Sell, symbol.clone(), position.quantity, position.current_price)
                .with_tag("windfall");
            candidate.priority = self.priority(symbol, unrealized_return - trailing_cagr, input);
            candidate.reason = format!(
                "{symbol} is up {:.1}%, {:.1}pp above its trailing CAGR band — take profit",
                unrealized_return * 100.0,
                (unrealized_return - trailing_cagr) * 100.0
            );
            if self.check_sell_eligible(&candidate, input, _config) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    fn averaging_down(&self, input: &OpportunityInput<'_>, config: &PlannerConfig) -> Vec<ActionCandidate> {
        let mut candidates = Vec::new();
        for (symbol, position) in input.context.positions.iter() {
            if position.is_flat() {
                continue;
            }
            let quality = input.context.quality_score(symbol);
            if quality < AVERAGING_DOWN_QUALITY_MIN {
                continue;
            }
            let Some(security) = input.context.securities.get(symbol) else {
                continue;
            };
            if !security.allow_buy {
                continue;
            }
            let discount = (position.avg_price.0 - position.current_price.0) / position.avg_price.0.max(1e-9);
            if discount < AVERAGING_DOWN_DISCOUNT {
                continue;
            }
            let quantity = Self::lot_quantity(config.min_trade_value * 2.0, security.price.0, security.min_lot);
            if quantity <= 0 {
                continue;
            }
            let mut candidate = ActionCandidate::new(Side::Buy, symbol.clone(), quantity, security.price)
                .with_tag("averaging_down");
            if !Self::is_worthwhile(candidate.value.0, config) {
                continue;
            }
            candidate.priority = self.priority(symbol, discount, input);
            candidate.reason = format!(
                "{symbol} is {:.1}% below average cost with quality {:.2} — add to the position",
                discount * 100.0,
                quality
            );
            if self.check_buy_eligible(&candidate, input, config) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    fn rebalance_sells(&self, input: &OpportunityInput<'_>, config: &PlannerConfig) -> Vec<ActionCandidate> {
        let Some(targets) = input.target_weights else {
            return Vec::new();
        };
        let mut candidates = Vec::new();
        let total_value = input.context.total_value().0;
        for (symbol, position) in input.context.positions.iter() {
            if position.is_flat() {
                continue;
            }
            let current_weight = input.context.position_weight(symbol);
            let target_weight = targets.get(symbol).copied().unwrap_or(0.0);
            let gap = current_weight - target_weight;
            if gap <= REBALANCE_GAP_THRESHOLD {
                continue;
            }
            let Some(security) = input.context.securities.get(symbol) else {
                continue;
            };
            if !security.allow_sell {
                continue;
            }
            let excess_value = gap * total_value;
            let quantity = Self::lot_quantity(excess_value, security.price.0, security.min_lot)
                .min(position.quantity);
            if quantity <= 0 {
                continue;
            }
            let mut candidate = ActionCandidate::new(Side::Sell, symbol.clone(), quantity, security.price)
                .with_tag("rebalance");
            if !Self::is_worthwhile(candidate.value.0, config) {
                continue;
            }
            candidate.priority = self.priority(symbol, gap, input);
            candidate.reason = format!(
                "{symbol} is {:.1}pp overweight vs its {:.1}% target — trim",
                gap * 100.0,
                target_weight * 100.0
            );
            if self.check_sell_eligible(&candidate, input, config) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    fn rebalance_buys(&self, input: &OpportunityInput<'_>, config: &PlannerConfig) -> Vec<ActionCandidate> {
        let Some(targets) = input.target_weights else {
            return Vec::new();
        };
        let mut candidates = Vec::new();
        let total_value = input.context.total_value().0;
        for (symbol, target_weight) in targets.iter() {
            let Some(security) = input.context.securities.get(symbol) else {
                continue;
            };
            if !security.active || !security.allow_buy {
                continue;
            }
            let current_weight = input.context.position_weight(symbol);
            let gap = target_weight - current_weight;
            if gap <= REBALANCE_GAP_THRESHOLD {
                continue;
            }
            let shortfall_value = gap * total_value;
            let affordable = shortfall_value.min(input.available_cash.0);
            let quantity = Self::lot_quantity(affordable, security.price.0, security.min_lot);
            if quantity <= 0 {
                continue;
            }
            let mut candidate = ActionCandidate::new(Side::Buy, symbol.clone(), quantity, security.price)
                .with_tag("rebalance");
            if current_weight < 1e-9 {
                candidate = candidate.with_tag("new_addition");
            }
            if !Self::is_worthwhile(candidate.value.0, config) {
                continue;
            }
            candidate.priority = self.priority(symbol, gap, input);
            candidate.reason = format!(
                "{symbol} is {:.1}pp underweight vs its {:.1}% target — buy",
                gap * 100.0,
                target_weight * 100.0
            );
            if self.check_buy_eligible(&candidate, input, config) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// High-priority buys not already covered by rebalancing: securities
    /// with a meaningful dividend yield that the rebalance pass skipped
    /// (no explicit target, or the gap fell under the rebalance threshold).
    fn opportunity_buys(
        &self,
        input: &OpportunityInput<'_>,
        config: &PlannerConfig,
        so_far: &CategorisedCandidates,
    ) -> Vec<ActionCandidate> {
        let already_covered: std::collections::BTreeSet<&Symbol> = so_far
            .rebalance_buys
            .iter()
            .chain(so_far.averaging_down.iter())
            .map(|c| &c.symbol)
            .collect();

        let mut candidates = Vec::new();
        for (symbol, security) in input.context.securities.iter() {
            if already_covered.contains(symbol) || !security.active || !security.allow_buy {
                continue;
            }
            let dividend_bonus = input.context.dividend_yield(symbol);
            let quality = input.context.quality_score(symbol);
            if dividend_bonus <= 0.0 && quality < AVERAGING_DOWN_QUALITY_MIN {
                continue;
            }
            let target_value = (config.min_trade_value * 2.0).min(input.available_cash.0);
            let quantity = Self::lot_quantity(target_value, security.price.0, security.min_lot);
            if quantity <= 0 {
                continue;
            }
            let mut candidate = ActionCandidate::new(Side::Buy, symbol.clone(), quantity, security.price)
                .with_tag("opportunity");
            if dividend_bonus > 0.0 {
                candidate = candidate.with_tag("dividend_bonus");
            }
            if !Self::is_worthwhile(candidate.value.0, config) {
                continue;
            }
            candidate.priority = self.priority(symbol, 0.0, input);
            candidate.reason = format!(
                "{symbol}: quality {:.2}, dividend yield {:.1}% — opportunistic buy",
                quality,
                dividend_bonus * 100.0
            );
            if self.check_buy_eligible(&candidate, input, config) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::model::{Eur, Position, Security};

    fn context_with(symbol: &str, quantity: i64, avg_price: f64, current_price: f64) -> PortfolioContext {
        let mut context = PortfolioContext {
            as_of: Utc::now(),
            cash: Eur(10_000.0),
            ..Default::default()
        };
        context.positions.insert(
            Symbol::from(symbol),
            Position {
                symbol: Symbol::from(symbol),
                quantity,
                avg_price: Eur(avg_price),
                current_price: Eur(current_price),
                opened_at: Utc::now() - chrono::Duration::days(400),
                flat_since: None,
                last_buy_at: None,
                last_sell_at: None,
            },
        );
        let mut security = Security::new(symbol, symbol, Eur(current_price));
        security.min_lot = 1;
        context.securities.insert(Symbol::from(symbol), security);
        context
    }

    #[test]
    fn worthwhileness_rejects_small_trades() {
        let config = PlannerConfig::default();
        assert!(!OpportunityIdentifier::is_worthwhile(1.0, &config));
        assert!(OpportunityIdentifier::is_worthwhile(10_000.0, &config));
    }

    #[test]
    fn averaging_down_requires_quality_and_discount() {
        let mut context = context_with("ACME", 10, 100.0, 85.0);
        context.quality_scores.insert(Symbol::from("ACME"), 0.8);
        let input = OpportunityInput {
            context: &context,
            available_cash: Eur(5_000.0),
            target_weights: None,
            recently_sold: &[],
            ineligible_symbols: &[],
            as_of: Utc::now(),
        };
        let identifier = OpportunityIdentifier::new();
        let config = PlannerConfig::default();
        let result = identifier.identify(&input, &config);
        assert!(!result.averaging_down.is_empty());
        assert_eq!(result.averaging_down[0].side, Side::Buy);
    }

    #[test]
    fn profit_taking_fires_above_windfall_band() {
        let mut context = context_with("NVDA", 10, 100.0, 185.0);
        context.trailing_cagr.insert(Symbol::from("NVDA"), 0.10);
        let input = OpportunityInput {
            context: &context,
            available_cash: Eur(0.0),
            target_weights: None,
            recently_sold: &[],
            ineligible_symbols: &[],
            as_of: Utc::now(),
        };
        let identifier = OpportunityIdentifier::new();
        let config = PlannerConfig::default();
        let result = identifier.identify(&input, &config);
        assert!(!result.profit_taking.is_empty());
        assert_eq!(result.profit_taking[0].side, Side::Sell);
    }

    #[test]
    fn ineligible_symbol_list_suppresses_all_categories() {
        let mut context = context_with("NVDA", 10, 100.0, 185.0);
        context.trailing_cagr.insert(Symbol::from("NVDA"), 0.10);
        let ineligible = vec![Symbol::from("NVDA")];
        let input = OpportunityInput {
            context: &context,
            available_cash: Eur(0.0),
            target_weights: None,
            recently_sold: &[],
            ineligible_symbols: &ineligible,
            as_of: Utc::now(),
        };
        let identifier = OpportunityIdentifier::new();
        let config = PlannerConfig::default();
        let result = identifier.identify(&input, &config);
        assert!(result.profit_taking.is_empty());
    }
}
