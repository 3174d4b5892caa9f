use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::{Eur, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Side {
    Buy,
    Sell,
}

/// A single candidate action emitted by the Opportunity Identifier (C1) and
/// chained into [`super::Sequence`]s by the Sequence Generator (C2).
///
/// `tags` carries classification used downstream by scoring and by the
/// sequence validity rule that allows a symbol to recur within one sequence
/// only when tagged `partial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub side: Side,
    pub symbol: Symbol,
    /// Human-readable name (spec §3); defaults to the symbol itself when the
    /// caller has no richer security name on hand.
    pub name: String,
    pub quantity: i64,
    pub unit_price: Eur,
    pub value: Eur,
    pub currency: String,
    pub priority: f64,
    pub reason: String,
    pub tags: BTreeSet<String>,
}

impl ActionCandidate {
    pub fn new(side: Side, symbol: impl Into<Symbol>, quantity: i64, unit_price: Eur) -> Self {
        let symbol = symbol.into();
        let value = Eur(quantity as f64 * unit_price.0);
        Self {
            name: symbol.0.clone(),
            side,
            symbol,
            quantity,
            unit_price,
            value,
            currency: "EUR".to_string(),
            priority: 0.0,
            reason: String::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn is_partial(&self) -> bool {
        self.tags.contains("partial")
    }

    pub fn signed_cash_delta(&self) -> Eur {
        match self.side {
            Side::Buy => Eur(-self.value.0),
            Side::Sell => Eur(self.value.0),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
