use serde::{Deserialize, Serialize};

use crate::sorted_vec_map::SortedVecMap;

use super::{Eur, Sequence};

/// The scored output of the Sequence Evaluator (C3) for a single sequence
/// under a single scenario (or the aggregate across Monte-Carlo paths, see
/// spec §4.3). `total_score` is what the beam orders on; the component
/// scores are retained for the narrative and for Pareto-front mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub sequence: Sequence,
    pub end_state_score: f64,
    pub diversification_score: f64,
    pub risk_score: f64,
    pub total_score: f64,
    pub total_cost: Eur,
    pub cash_required: Eur,
    pub feasible: bool,
    pub metrics: SortedVecMap<String, f64>,
    /// Why this sequence was rejected, when `feasible` is `false` (spec §7:
    /// infeasibility is always explanatory, never a bare flag).
    pub reason: Option<String>,
}

impl EvaluationResult {
    pub fn infeasible(sequence: Sequence, reason: impl Into<String>) -> Self {
        Self {
            sequence,
            end_state_score: f64::MIN,
            diversification_score: 0.0,
            risk_score: 0.0,
            total_score: f64::MIN,
            total_cost: Eur(0.0),
            cash_required: Eur(0.0),
            feasible: false,
            metrics: SortedVecMap::new(),
            reason: Some(reason.into()),
        }
    }

    /// Pareto dominance over `(end_state_score, diversification_score,
    /// -risk_score, -total_cost)`, used by beam maintenance in Pareto-front
    /// mode (§4.3) — four objectives, cost included as lower-is-better.
    pub fn dominates(&self, other: &Self) -> bool {
        let better_or_equal = self.end_state_score >= other.end_state_score
            && self.diversification_score >= other.diversification_score
            && self.risk_score <= other.risk_score
            && self.total_cost.0 <= other.total_cost.0;
        let strictly_better = self.end_state_score > other.end_state_score
            || self.diversification_score > other.diversification_score
            || self.risk_score < other.risk_score
            || self.total_cost.0 < other.total_cost.0;
        better_or_equal && strictly_better
    }
}
