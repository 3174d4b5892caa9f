//! End-to-end `CreatePlan` scenarios (spec §8), run against a single
//! in-process evaluator the way a demo deployment would be wired.

mod common;

use cairn::config::PlannerConfig;
use cairn::rpc::{CoordinatorService, PlannerService};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn direct_buy_with_available_cash_produces_a_feasible_plan() {
    let service = PlannerService::single_process(PlannerConfig::default());
    let request = common::create_plan_request(5_000.0);

    let response = service
        .create_plan(request, &CancellationToken::new())
        .await
        .expect("create_plan should not surface an RPC error");

    assert!(response.plan.feasible, "plan should be feasible: {:?}", response.plan.error);
    assert!(!response.plan.steps.is_empty(), "a cash-rich portfolio should recommend at least one action");
    assert!(response.stats.opportunities_identified > 0);
    assert!(response.stats.sequences_generated > 0);
}

#[tokio::test]
async fn cash_only_empty_universe_yields_no_actions() {
    let service = PlannerService::single_process(PlannerConfig::default());
    let request = common::cash_only_request(10_000.0);

    let response = service
        .create_plan(request, &CancellationToken::new())
        .await
        .expect("create_plan should not surface an RPC error");

    assert!(response.plan.feasible, "an empty opportunity set is still a feasible (empty) plan");
    assert!(response.plan.steps.is_empty());
    assert!(response.plan.error.is_none());
    assert_eq!(response.stats.opportunities_identified, 0);
}

#[tokio::test]
async fn cancellation_before_the_pipeline_starts_short_circuits() {
    let service = PlannerService::single_process(PlannerConfig::default());
    let request = common::create_plan_request(5_000.0);
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let response = service
        .create_plan(request, &cancellation)
        .await
        .expect("a cancelled request still returns a response, not an error");

    assert!(!response.plan.feasible);
    assert_eq!(response.plan.error.as_deref(), Some("request cancelled"));
}
