//! The Plan Assembler (P): restates the winning [`EvaluationResult`] as a
//! narrated, step-by-step [`Plan`] (spec §4.8). Grounded on the original
//! system's `plan_assembler.py` and its tag-keyed narrative templates.

use crate::model::{ActionCandidate, Eur, EvaluationResult, Plan, PlanStep, Side};

/// Tags consulted in this order when picking a step's narrative template
/// (spec §4.8); the first match wins, falling back to a generic template
/// when an action carries none of them.
const TEMPLATE_TAG_PRIORITY: [&str; 6] = [
    "windfall",
    "profit_taking",
    "rebalance",
    "averaging_down",
    "quality",
    "opportunity",
];

pub struct PlanAssembler;

impl Default for PlanAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Walks `result`'s sequence in order, producing running cumulative cost
    /// and cash delta per step (spec §4.8) alongside a templated rationale.
    /// Narration never changes the scores carried over from `result`.
    pub fn assemble(&self, result: &EvaluationResult, transaction_fee_fixed: f64, transaction_fee_percent: f64) -> Plan {
        let mut steps = Vec::with_capacity(result.sequence.len());
        let mut cumulative_cost = 0.0;
        let mut cumulative_cash_delta = 0.0;

        for action in result.sequence.steps() {
            let gross_value = action.quantity as f64 * action.unit_price.0;
            let cost = transaction_fee_fixed + gross_value * transaction_fee_percent;
            cumulative_cost += cost;
            cumulative_cash_delta += action.signed_cash_delta().0;

            steps.push(PlanStep {
                action: action.clone(),
                cumulative_cost: Eur(cumulative_cost),
                cumulative_cash_delta: Eur(cumulative_cash_delta),
                rationale: step_rationale(action),
            });
        }

        Plan {
            narrative: top_level_narrative(&steps, result),
            steps,
            end_state_score: result.end_state_score,
            diversification_score: result.diversification_score,
            risk_score: result.risk_score,
            total_score: result.total_score,
            cash_required: result.cash_required,
            feasible: result.feasible,
            error: None,
            metadata: result.metrics.clone(),
        }
    }
}

/// Picks the highest-priority matching tag's template and renders it against
/// `action`'s own fields (spec §4.8's "tag set on an action selects a
/// template").
fn step_rationale(action: &ActionCandidate) -> String {
    for tag in TEMPLATE_TAG_PRIORITY {
        if action.tags.contains(tag) {
            return render_template(tag, action);
        }
    }
    generic_template(action)
}

fn render_template(tag: &str, action: &ActionCandidate) -> String {
    let symbol = &action.symbol;
    let quantity = action.quantity;
    let value = action.value.0;
    match tag {
        "windfall" => format!(
            "Sell {quantity} {symbol} ({value:.2} EUR) to lock in a windfall gain: {}",
            action.reason
        ),
        "profit_taking" => format!("Sell {quantity} {symbol} ({value:.2} EUR) to take profit: {}", action.reason),
        "rebalance" => format!(
            "{} {quantity} {symbol} ({value:.2} EUR) to bring the portfolio back toward its target weights: {}",
            side_verb(action.side),
            action.reason
        ),
        "averaging_down" => format!(
            "Buy {quantity} {symbol} ({value:.2} EUR) below its average cost, adding to a quality holding at a discount: {}",
            action.reason
        ),
        "quality" => format!("{} {quantity} {symbol} ({value:.2} EUR) on fundamentals: {}", side_verb(action.side), action.reason),
        "opportunity" => format!("Buy {quantity} {symbol} ({value:.2} EUR) to deploy idle cash: {}", action.reason),
        _ => generic_template(action),
    }
}

fn generic_template(action: &ActionCandidate) -> String {
    format!(
        "{} {} {} ({:.2} EUR): {}",
        side_verb(action.side),
        action.quantity,
        action.symbol,
        action.value.0,
        action.reason
    )
}

fn side_verb(side: Side) -> &'static str {
    match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    }
}

/// Summarises step count, net cash effect and the scenario-tolerant total
/// score into one sentence; per-step rationale carries the detail (spec
/// §4.8).
fn top_level_narrative(steps: &[PlanStep], result: &EvaluationResult) -> String {
    if steps.is_empty() {
        return "No actions recommended for this portfolio right now.".to_string();
    }
    let buys = steps.iter().filter(|s| s.action.side == Side::Buy).count();
    let sells = steps.iter().filter(|s| s.action.side == Side::Sell).count();
    let net_cash_delta = steps.last().map(|s| s.cumulative_cash_delta.0).unwrap_or(0.0);
    let direction = if net_cash_delta >= 0.0 { "frees up" } else { "deploys" };

    format!(
        "A {}-step plan ({buys} buy{}, {sells} sell{}) that {direction} {:.2} EUR of cash, scoring {:.3} overall.",
        steps.len(),
        if buys == 1 { "" } else { "s" },
        if sells == 1 { "" } else { "s" },
        net_cash_delta.abs(),
        result.total_score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sequence;

    fn windfall_result() -> EvaluationResult {
        let mut action = ActionCandidate::new(Side::Sell, "AAPL", 10, Eur(200.0)).with_tag("windfall");
        action.reason = "AAPL is up 35%, 15pp above its trailing CAGR band".to_string();
        let sequence = Sequence::try_new(vec![action]).unwrap();
        EvaluationResult {
            sequence,
            end_state_score: 0.8,
            diversification_score: 0.7,
            risk_score: 0.3,
            total_score: 0.8,
            total_cost: Eur(3.0),
            cash_required: Eur(0.0),
            feasible: true,
            metrics: Default::default(),
            reason: None,
        }
    }

    #[test]
    fn assembles_one_step_per_action_with_running_totals() {
        let assembler = PlanAssembler::new();
        let result = windfall_result();
        let plan = assembler.assemble(&result, 1.0, 0.001);
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps[0].cumulative_cost.0 > 0.0);
        assert!(plan.steps[0].cumulative_cash_delta.0 > 0.0);
        assert!(plan.steps[0].rationale.contains("windfall") || plan.steps[0].rationale.contains("lock in"));
        assert!(plan.feasible);
    }

    #[test]
    fn empty_sequence_result_never_reaches_the_assembler() {
        // Plan::no_actions / Plan::empty cover the no-sequence paths; the
        // assembler only ever receives a feasible, non-empty EvaluationResult.
        let result = windfall_result();
        let assembler = PlanAssembler::new();
        let plan = assembler.assemble(&result, 1.0, 0.001);
        assert!(!plan.narrative.is_empty());
    }

    #[test]
    fn rebalance_tag_mentions_target_weights_in_the_rationale() {
        let action = ActionCandidate::new(Side::Buy, "SAP", 5, Eur(120.0)).with_tag("rebalance");
        let sequence = Sequence::try_new(vec![action]).unwrap();
        let result = EvaluationResult {
            sequence,
            end_state_score: 0.5,
            diversification_score: 0.5,
            risk_score: 0.5,
            total_score: 0.5,
            total_cost: Eur(1.0),
            cash_required: Eur(600.0),
            feasible: true,
            metrics: Default::default(),
            reason: None,
        };
        let plan = PlanAssembler::new().assemble(&result, 1.0, 0.001);
        assert!(plan.steps[0].rationale.contains("target weight"));
    }
}
