use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sorted_vec_map::SortedVecMap;

use super::{Eur, GroupKey, Position, Security, Symbol, OTHER_GROUP};

/// The full, immutable-after-construction snapshot the entire pipeline reads
/// from: holdings, cash, the security universe and the two target-weight
/// tables (country and industry groups). `SortedVecMap` keeps every table in
/// deterministic key order so that, given identical inputs, the generator
/// and evaluator always walk symbols in the same order (spec §8 invariant 5:
/// byte-identical output).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub as_of: DateTime<Utc>,
    pub cash: Eur,
    pub positions: SortedVecMap<Symbol, Position>,
    pub securities: SortedVecMap<Symbol, Security>,
    pub country_targets: SortedVecMap<GroupKey, f64>,
    pub industry_targets: SortedVecMap<GroupKey, f64>,
    /// Auxiliary per-symbol tables (spec §3): a fundamentals quality score
    /// in `[0, 1]`, trailing dividend yield, and the trailing CAGR band a
    /// windfall return is measured against (C1's `profit_taking` trigger).
    pub quality_scores: SortedVecMap<Symbol, f64>,
    pub dividend_yields: SortedVecMap<Symbol, f64>,
    pub trailing_cagr: SortedVecMap<Symbol, f64>,
    /// Pre-aggregated stability score in `[0, 1]`, blending volatility,
    /// drawdown, Sharpe and Sortino (spec §4.4 "stability"); fetched once
    /// per request the same way `quality_scores` is, since neither the
    /// portfolio snapshot nor the RPC surface carries raw price history.
    pub risk_scores: SortedVecMap<Symbol, f64>,
}

impl PortfolioContext {
    pub fn total_value(&self) -> Eur {
        let holdings: f64 = self.positions.values().map(|p| p.market_value().0).sum();
        Eur(holdings + self.cash.0)
    }

    pub fn position_weight(&self, symbol: &Symbol) -> f64 {
        let total = self.total_value().0;
        if total <= 0.0 {
            return 0.0;
        }
        self.positions
            .get(symbol)
            .map(|p| p.market_value().0 / total)
            .unwrap_or(0.0)
    }

    pub fn country_of(&self, symbol: &Symbol) -> GroupKey {
        self.securities
            .get(symbol)
            .and_then(|s| s.country.clone())
            .map(GroupKey)
            .unwrap_or_else(|| GroupKey(OTHER_GROUP.to_string()))
    }

    pub fn industry_of(&self, symbol: &Symbol) -> GroupKey {
        self.securities
            .get(symbol)
            .and_then(|s| s.industry.clone())
            .map(GroupKey)
            .unwrap_or_else(|| GroupKey(OTHER_GROUP.to_string()))
    }

    pub fn group_weight(&self, grouped_by: impl Fn(&Symbol) -> GroupKey, group: &GroupKey) -> f64 {
        let total = self.total_value().0;
        if total <= 0.0 {
            return 0.0;
        }
        self.positions
            .iter()
            .filter(|(symbol, _)| grouped_by(symbol) == *group)
            .map(|(_, position)| position.market_value().0)
            .sum::<f64>()
            / total
    }

    pub fn country_weight(&self, group: &GroupKey) -> f64 {
        self.group_weight(|symbol| self.country_of(symbol), group)
    }

    pub fn industry_weight(&self, group: &GroupKey) -> f64 {
        self.group_weight(|symbol| self.industry_of(symbol), group)
    }

    /// Drop positions that have been flat past their grace window, the way a
    /// fresh context would be rebuilt for the next request.
    pub fn prune_expired_positions(&mut self) {
        let as_of = self.as_of;
        self.positions.retain(|_, position| !position.is_expired(as_of));
    }

    pub fn quality_score(&self, symbol: &Symbol) -> f64 {
        self.quality_scores.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn dividend_yield(&self, symbol: &Symbol) -> f64 {
        self.dividend_yields.get(symbol).copied().unwrap_or(0.0)
    }

    /// Neutral (0.5) for a symbol with no stability analytics on record,
    /// rather than penalising it for missing data.
    pub fn risk_score(&self, symbol: &Symbol) -> f64 {
        self.risk_scores.get(symbol).copied().unwrap_or(0.5)
    }

    /// The trailing CAGR band a windfall return is measured against (spec
    /// §4.2); `None` when no trailing series is on record, in which case C1
    /// treats the symbol as ineligible for `profit_taking`.
    pub fn trailing_cagr(&self, symbol: &Symbol) -> Option<f64> {
        self.trailing_cagr.get(symbol).copied()
    }
}
