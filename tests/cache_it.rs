//! Recommendation cache scenario (spec §8): two identical `CreatePlan`
//! requests against the same portfolio should fingerprint to the same cache
//! key, so the second call is served from the cache rather than re-run
//! through the whole pipeline.

mod common;

use cairn::config::PlannerConfig;
use cairn::rpc::{CoordinatorService, PlannerService};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn a_repeated_request_is_served_from_the_recommendation_cache() {
    let service = PlannerService::single_process(PlannerConfig::default());

    let first = service
        .create_plan(common::create_plan_request(5_000.0), &CancellationToken::new())
        .await
        .expect("first create_plan call should not surface an RPC error");
    assert!(first.plan.feasible);

    let (hits_before, _, _) = service.cache().stats.snapshot();

    let second = service
        .create_plan(common::create_plan_request(5_000.0), &CancellationToken::new())
        .await
        .expect("second create_plan call should not surface an RPC error");

    let (hits_after, _, _) = service.cache().stats.snapshot();

    assert!(hits_after > hits_before, "an identical request should register as a cache hit");
    assert_eq!(second.plan.narrative, first.plan.narrative);
    assert_eq!(second.plan.total_score, first.plan.total_score);
}
