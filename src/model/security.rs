use serde::{Deserialize, Serialize};

use super::{Eur, Symbol};

/// A tradeable security in the universe (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub symbol: Symbol,
    pub isin: Option<String>,
    pub name: String,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub currency: String,
    pub price: Eur,
    /// Minimum lot size; quantities for this symbol must be multiples of it.
    pub min_lot: i64,
    pub allow_buy: bool,
    pub allow_sell: bool,
    /// Percentage in `[0, 100]`, overrides the default upper concentration bound.
    pub min_portfolio_target: Option<f64>,
    /// Percentage in `[0, 100]`, overrides the default upper concentration bound.
    pub max_portfolio_target: Option<f64>,
    pub market_cap: Option<Eur>,
    pub active: bool,
}

impl Security {
    pub fn new(symbol: impl Into<Symbol>, name: impl Into<String>, price: Eur) -> Self {
        Self {
            symbol: symbol.into(),
            isin: None,
            name: name.into(),
            country: None,
            industry: None,
            currency: "EUR".to_string(),
            price,
            min_lot: 1,
            allow_buy: true,
            allow_sell: true,
            min_portfolio_target: None,
            max_portfolio_target: None,
            market_cap: None,
            active: true,
        }
    }
}
