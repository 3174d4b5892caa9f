use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PlannerResult, SystemError};

use super::{ActionCandidate, Eur};

/// An ordered chain of actions considered together, the unit the Sequence
/// Evaluator (C3) scores and the Global Beam Coordinator (C4) ranks.
///
/// Invariants (spec §3, enforced by [`Sequence::try_new`] rather than left to
/// callers): non-empty, and no symbol repeats unless every occurrence beyond
/// the first is tagged `partial` (a staged buy/sell split across steps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence(Vec<ActionCandidate>);

impl Sequence {
    pub fn try_new(steps: Vec<ActionCandidate>) -> PlannerResult<Self> {
        if steps.is_empty() {
            return Err(SystemError::InvariantViolation(
                "sequence must contain at least one action".to_string(),
            )
            .into());
        }
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.symbol.clone()) && !step.is_partial() {
                return Err(SystemError::InvariantViolation(format!(
                    "symbol '{}' repeats in a sequence without the 'partial' tag",
                    step.symbol
                ))
                .into());
            }
        }
        Ok(Self(steps))
    }

    pub fn steps(&self) -> &[ActionCandidate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn last(&self) -> &ActionCandidate {
        self.0.last().expect("Sequence is never empty")
    }

    /// Running cash delta after applying every step in order; positive means
    /// net cash generated, negative means net cash consumed.
    pub fn cumulative_cash_delta(&self) -> Eur {
        Eur(self
            .0
            .iter()
            .map(|step| step.signed_cash_delta().0)
            .sum())
    }

    /// Whether, given `available_cash`, every prefix of the sequence stays
    /// cash-feasible (the running balance never goes negative). Sells free
    /// cash before later buys consume it, so this must be checked as a
    /// running minimum rather than just the final total.
    pub fn is_cash_feasible(&self, available_cash: Eur) -> bool {
        let mut balance = available_cash.0;
        for step in &self.0 {
            balance += step.signed_cash_delta().0;
            if balance < 0.0 {
                return false;
            }
        }
        true
    }

    pub fn extended(&self, next: ActionCandidate) -> PlannerResult<Self> {
        let mut steps = self.0.clone();
        steps.push(next);
        Self::try_new(steps)
    }

    pub fn into_steps(self) -> Vec<ActionCandidate> {
        self.0
    }
}
