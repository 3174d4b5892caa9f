//! `CreatePlan` (spec §6): the single entry point that runs the whole
//! pipeline end to end — C1 → C2 → C3/C4 → Safety Gate → P — consulting the
//! recommendation cache first and writing the winning plan back to it.
//! Grounded on the original system's `planning_coordinator.py`, which wires
//! the same components together behind one public call.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{info, instrument, warn};

use crate::config::PlannerConfig;
use crate::coordinator::{CoordinatorSettings, EvaluatorHandle, GlobalBeamCoordinator, LocalEvaluatorHandle};
use crate::generator::{GeneratorSettings, SequenceGenerator, DEFAULT_PATTERN_NAMES};
use crate::model::{CacheCategory, Eur, Plan, PortfolioFingerprint};
use crate::opportunity::{OpportunityIdentifier, OpportunityInput};
use crate::plan::PlanAssembler;
use crate::resilience::Cache;
use crate::safety::FrequencyLimiter;

use super::types::{default_evaluation_settings, CreatePlanRequest, CreatePlanResponse, CreatePlanStats, HealthResponse};

#[tonic::async_trait]
pub trait CoordinatorService: Send + Sync {
    async fn create_plan(
        &self,
        request: CreatePlanRequest,
        cancellation: &CancellationToken,
    ) -> Result<CreatePlanResponse, Status>;

    async fn health(&self) -> HealthResponse;
}

/// The full pipeline, constructed once at startup and shared across
/// requests (spec §5: the cache and circuit-breaker state are shared, and
/// the evaluator pool is a deployment-time concern, not a per-request one).
pub struct PlannerService {
    base_config: PlannerConfig,
    identifier: OpportunityIdentifier,
    generator: SequenceGenerator,
    coordinator: GlobalBeamCoordinator,
    assembler: PlanAssembler,
    frequency_limiter: FrequencyLimiter,
    cache: Cache,
}

impl PlannerService {
    pub fn new(base_config: PlannerConfig, evaluators: Vec<Arc<dyn EvaluatorHandle>>) -> Self {
        Self {
            base_config,
            identifier: OpportunityIdentifier::new(),
            generator: SequenceGenerator::new(),
            coordinator: GlobalBeamCoordinator::new(evaluators),
            assembler: PlanAssembler::new(),
            frequency_limiter: FrequencyLimiter::new(),
            cache: Cache::new(),
        }
    }

    /// A single in-process evaluator, for a demo/test deployment where the
    /// "distributed" pool is just this one process (spec §5: a single
    /// evaluator trivially satisfies round-robin dispatch).
    pub fn single_process(base_config: PlannerConfig) -> Self {
        let evaluator: Arc<dyn EvaluatorHandle> = Arc::new(LocalEvaluatorHandle::new("local-0"));
        Self::new(base_config, vec![evaluator])
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

#[tonic::async_trait]
impl CoordinatorService for PlannerService {
    #[instrument(skip_all, fields(positions = request.positions.len(), securities = request.securities.len()))]
    async fn create_plan(
        &self,
        request: CreatePlanRequest,
        cancellation: &CancellationToken,
    ) -> Result<CreatePlanResponse, Status> {
        let started = Instant::now();
        if cancellation.is_cancelled() {
            return Ok(cancelled_response(started));
        }

        let config = request.parameters.clone().into_config(&self.base_config);
        let context = request.build_context();
        let fingerprint = PortfolioFingerprint::compute(&context);

        if let Ok(Some(cached)) = self
            .cache
            .get::<Plan>(&fingerprint, CacheCategory::Recommendation, "plan", request.as_of)
            .await
        {
            info!(fingerprint = %fingerprint, "recommendation cache hit");
            return Ok(CreatePlanResponse {
                plan: cached,
                stats: CreatePlanStats {
                    wall_clock_seconds: started.elapsed().as_secs_f64(),
                    ..Default::default()
                },
            });
        }

        let target_weights = request.target_weights_map();
        let recently_sold = request.recently_sold_symbols();
        let ineligible = request.ineligible_symbols();
        let opportunity_input = OpportunityInput {
            context: &context,
            available_cash: Eur(request.available_cash),
            target_weights: target_weights.as_ref(),
            recently_sold: &recently_sold,
            ineligible_symbols: &ineligible,
            as_of: request.as_of,
        };
        let opportunities = self.identifier.identify(&opportunity_input, &config);
        let opportunities_identified = opportunities.total_count();

        if opportunities_identified == 0 {
            let plan = Plan::no_actions("no actions recommended");
            return Ok(finish(plan, started, opportunities_identified, 0, 0, 0, 0));
        }
        if cancellation.is_cancelled() {
            return Ok(cancelled_response(started));
        }

        let generator_settings = GeneratorSettings::from_config(&config, request.available_cash, &DEFAULT_PATTERN_NAMES);
        let batches = self.generator.generate(
            &opportunities,
            &context,
            &generator_settings,
            &Default::default(),
        );
        let sequences_generated: usize = batches.iter().map(|b| b.sequences.len()).sum();

        if sequences_generated == 0 {
            let plan = Plan::no_actions("no actions recommended");
            return Ok(finish(plan, started, opportunities_identified, 0, 0, 0, 0));
        }

        let coordinator_settings = CoordinatorSettings::from_config(&config);
        let eval_settings = default_evaluation_settings(&config);
        let outcome = self
            .coordinator
            .run(batches, &context, &eval_settings, &coordinator_settings, cancellation)
            .await
            .map_err(|err| Status::unavailable(err.to_string()))?;

        let plan = match outcome.best() {
            None => {
                let reason = outcome
                    .beam
                    .first()
                    .and_then(|result| result.reason.clone())
                    .unwrap_or_else(|| "no feasible sequence satisfied every constraint".to_string());
                Plan::empty(reason)
            }
            Some(best) => match self.gate_best_sequence(best, &config, request.as_of).await {
                Ok(()) => self.assembler.assemble(best, config.transaction_fee_fixed, config.transaction_fee_percent),
                Err(reason) => Plan::empty(reason),
            },
        };

        if plan.feasible {
            let _ = self
                .cache
                .put(&fingerprint, CacheCategory::Recommendation, "plan", &plan, request.as_of)
                .await;
        }

        Ok(finish(
            plan,
            started,
            opportunities_identified,
            sequences_generated,
            sequences_generated,
            outcome.batches_consumed,
            1,
        ))
    }

    async fn health(&self) -> HealthResponse {
        super::health::coordinator_health(self.coordinator.breakers()).await
    }
}

impl PlannerService {
    /// The Safety Gate's trade-frequency limiter, applied once per symbol
    /// in the winning sequence before the plan is handed back (spec §4.7:
    /// "reject the whole plan execution if the next trade would violate"
    /// the limiter's bounds). Per-candidate eligibility (cooldowns, min
    /// hold, max loss) already ran inside C1 (spec §4.2).
    async fn gate_best_sequence(
        &self,
        best: &crate::model::EvaluationResult,
        config: &PlannerConfig,
        as_of: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), String> {
        for action in best.sequence.steps() {
            if let Err(err) = self
                .frequency_limiter
                .check_and_record(&action.symbol, config, as_of)
                .await
            {
                warn!(symbol = %action.symbol, error = %err, "safety gate rejected the winning plan");
                return Err(err.to_string());
            }
        }
        Ok(())
    }
}

fn cancelled_response(started: Instant) -> CreatePlanResponse {
    CreatePlanResponse {
        plan: Plan::empty("request cancelled"),
        stats: CreatePlanStats {
            wall_clock_seconds: started.elapsed().as_secs_f64(),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{EvaluatorPoolConfig, PortfolioSummary, SearchParameters};

    fn empty_request() -> CreatePlanRequest {
        CreatePlanRequest {
            portfolio_context: PortfolioSummary::default(),
            positions: Vec::new(),
            securities: Vec::new(),
            available_cash: 0.0,
            target_weights: None,
            current_prices: None,
            parameters: SearchParameters::default(),
            evaluator_config: EvaluatorPoolConfig::default(),
            quality_scores: Default::default(),
            dividend_yields: Default::default(),
            trailing_cagr: Default::default(),
            risk_scores: Default::default(),
            recently_sold: Vec::new(),
            ineligible_symbols: Vec::new(),
            as_of: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn an_empty_universe_produces_a_feasible_no_actions_plan() {
        let service = PlannerService::single_process(PlannerConfig::default());
        let response = service.create_plan(empty_request(), &CancellationToken::new()).await.unwrap();
        assert!(response.plan.feasible);
        assert!(response.plan.steps.is_empty());
        assert_eq!(response.stats.opportunities_identified, 0);
    }

    #[tokio::test]
    async fn health_reports_ok_with_no_calls_yet() {
        let service = PlannerService::single_process(PlannerConfig::default());
        let health = service.health().await;
        assert!(health.healthy);
        assert_eq!(health.status, "ok");
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    plan: Plan,
    started: Instant,
    opportunities_identified: usize,
    sequences_generated: usize,
    sequences_evaluated: usize,
    batches_processed: u64,
    evaluators_used: usize,
) -> CreatePlanResponse {
    CreatePlanResponse {
        plan,
        stats: CreatePlanStats {
            wall_clock_seconds: started.elapsed().as_secs_f64(),
            opportunities_identified,
            sequences_generated,
            sequences_evaluated,
            batches_processed,
            evaluators_used,
        },
    }
}
