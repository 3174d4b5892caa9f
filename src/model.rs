//! The planner's data model (spec §3).
//!
//! Everything here is either immutable after construction (`PortfolioContext`)
//! or owned by exactly one stage of the pipeline and discarded at the end of
//! a request (`ActionCandidate`, `Sequence`); `Plan` is the single externally
//! observable output.

pub mod candidate;
pub mod cache_entry;
pub mod context;
pub mod evaluation;
pub mod fingerprint;
pub mod plan;
pub mod position;
pub mod security;
pub mod sequence;

pub use candidate::{ActionCandidate, Side};
pub use cache_entry::{CacheCategory, CacheEntry};
pub use context::PortfolioContext;
pub use evaluation::EvaluationResult;
pub use fingerprint::PortfolioFingerprint;
pub use plan::{Plan, PlanStep};
pub use position::Position;
pub use security::Security;
pub use sequence::Sequence;

use crate::impl_add_sub_mul_div_primitive;
use crate::impl_from_primitive;
use serde::{Deserialize, Serialize};

/// A EUR-denominated amount: market value, cash, transaction cost, price.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Eur(pub f64);
impl_from_primitive!(Eur, f64);
impl_add_sub_mul_div_primitive!(Eur, f64);

impl Eur {
    pub fn max(self, other: Self) -> Self {
        Eur(self.0.max(other.0))
    }
    pub fn is_negative(self) -> bool {
        self.0 < 0.0
    }
}

/// A portfolio weight or score fraction, conventionally in `[0, 1]` but not
/// clamped at construction (callers clamp where the spec requires it).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Weight(pub f64);
impl_from_primitive!(Weight, f64);
impl_add_sub_mul_div_primitive!(Weight, f64);

/// A ticker / ISIN-less symbol, the unique key for securities and positions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol(value)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A country or industry group bucket (`"OTHER"` for unknown raw values, per
/// §3's grouping tables).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey(pub String);

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        GroupKey(value.to_string())
    }
}

pub const OTHER_GROUP: &str = "OTHER";
