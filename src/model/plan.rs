use serde::{Deserialize, Serialize};

use crate::sorted_vec_map::SortedVecMap;

use super::{ActionCandidate, Eur};

/// One step of an assembled [`Plan`]: the action plus the running totals a
/// client needs to render a confirmation screen without re-deriving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: ActionCandidate,
    pub cumulative_cost: Eur,
    pub cumulative_cash_delta: Eur,
    pub rationale: String,
}

/// The final output of the Plan Assembler (P): the winning sequence restated
/// as an ordered, human-narrated list of steps, plus the score breakdown
/// that produced it. `error` is set instead of `steps` being empty when the
/// Safety Gate rejects every candidate the search found, so that a caller
/// can always render either a plan or a reason (spec §8 scenario 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub narrative: String,
    pub end_state_score: f64,
    pub diversification_score: f64,
    pub risk_score: f64,
    pub total_score: f64,
    pub cash_required: Eur,
    pub feasible: bool,
    pub error: Option<String>,
    pub metadata: SortedVecMap<String, String>,
}

impl Plan {
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            narrative: String::new(),
            end_state_score: 0.0,
            diversification_score: 0.0,
            risk_score: 0.0,
            total_score: 0.0,
            cash_required: Eur(0.0),
            feasible: false,
            error: Some(reason.into()),
            metadata: SortedVecMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// A feasible plan with no recommended actions (spec §8 scenario 3:
    /// all-cash portfolio, nothing worth trading) — distinct from
    /// [`Plan::empty`], whose `feasible=false` signals a rejected request.
    pub fn no_actions(narrative: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            narrative: narrative.into(),
            end_state_score: 0.0,
            diversification_score: 0.0,
            risk_score: 0.0,
            total_score: 0.0,
            cash_required: Eur(0.0),
            feasible: true,
            error: None,
            metadata: SortedVecMap::new(),
        }
    }
}
