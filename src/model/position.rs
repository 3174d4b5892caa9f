use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::POSITION_FLAT_GRACE_DAYS;

use super::{Eur, Symbol};

/// A held position. Created on the first buy of a symbol; destroyed only
/// once `quantity` reaches zero and stays flat for `POSITION_FLAT_GRACE_DAYS`
/// (spec §3), so a same-day round trip does not flicker the position out of
/// existence mid-plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: i64,
    pub avg_price: Eur,
    pub current_price: Eur,
    pub opened_at: DateTime<Utc>,
    /// Set the instant `quantity` first reaches zero; cleared on any buy.
    pub flat_since: Option<DateTime<Utc>>,
    pub last_buy_at: Option<DateTime<Utc>>,
    pub last_sell_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn market_value(&self) -> Eur {
        Eur(self.quantity as f64 * self.current_price.0)
    }

    pub fn cost_basis(&self) -> Eur {
        Eur(self.quantity as f64 * self.avg_price.0)
    }

    pub fn unrealized_return(&self) -> Option<f64> {
        if self.avg_price.0 <= 0.0 {
            None
        } else {
            Some((self.current_price.0 - self.avg_price.0) / self.avg_price.0)
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Whether a flat position has cleared its grace window and may be
    /// dropped from the context entirely.
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        match self.flat_since {
            Some(since) => (as_of - since).num_days() >= POSITION_FLAT_GRACE_DAYS,
            None => false,
        }
    }

    pub fn held_days(&self, as_of: DateTime<Utc>) -> i64 {
        (as_of - self.opened_at).num_days()
    }
}
