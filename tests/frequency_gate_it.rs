//! Safety Gate scenario (spec §8): a winning sequence that clears every
//! per-candidate eligibility check inside C1 can still be rejected wholesale
//! by the trade-frequency limiter once C4 has picked a winner.

mod common;

use cairn::config::PlannerConfig;
use cairn::rpc::{CoordinatorService, PlannerService};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn zero_daily_trade_cap_rejects_the_winning_plan() {
    let mut config = PlannerConfig::default();
    config.trade_frequency_limits_enabled = true;
    config.max_trades_per_day = 0;

    let service = PlannerService::single_process(config);
    let request = common::create_plan_request(5_000.0);

    let response = service
        .create_plan(request, &CancellationToken::new())
        .await
        .expect("create_plan should not surface an RPC error");

    assert!(!response.plan.feasible, "a zero daily cap should reject every symbol on the first trade");
    assert!(response.plan.steps.is_empty());
    assert!(response.plan.error.is_some());
}

#[tokio::test]
async fn default_config_leaves_the_limiter_unobtrusive() {
    let service = PlannerService::single_process(PlannerConfig::default());
    let request = common::create_plan_request(5_000.0);

    let response = service
        .create_plan(request, &CancellationToken::new())
        .await
        .expect("create_plan should not surface an RPC error");

    assert!(response.plan.feasible, "the default cap of 4 trades/day should not block a single-step plan");
}
