//! Resilience scenario (spec §8): an evaluator that fails on every call
//! should trip its circuit breaker, and once every evaluator in the pool is
//! open the coordinator should surface `EvaluatorUnavailable` rather than
//! hang or silently return an empty beam.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cairn::coordinator::{CoordinatorSettings, EvaluatorHandle, GlobalBeamCoordinator};
use cairn::error::CoordinatorError;
use cairn::evaluator::EvaluationSettings;
use cairn::generator::SequenceBatch;
use cairn::model::{ActionCandidate, Eur, EvaluationResult, PortfolioContext, Sequence, Side};
use cairn::resilience::CircuitState;
use tokio_util::sync::CancellationToken;

struct FailingEvaluatorHandle {
    name: String,
    calls: AtomicUsize,
}

impl FailingEvaluatorHandle {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[tonic::async_trait]
impl EvaluatorHandle for FailingEvaluatorHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        _sequences: &[Sequence],
        _context: &PortfolioContext,
        _settings: &EvaluationSettings,
    ) -> Result<Vec<EvaluationResult>, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err("evaluator unreachable".into())
    }
}

fn one_sequence_batch(number: u64) -> SequenceBatch {
    let candidate = ActionCandidate::new(Side::Buy, "ACME", 1, Eur(10.0));
    SequenceBatch {
        batch_number: number,
        sequences: vec![Sequence::try_new(vec![candidate]).unwrap()],
        more_available: number < 9,
    }
}

#[tokio::test]
async fn a_failing_evaluator_trips_its_breaker_and_exhausts_the_pool() {
    let handle = Arc::new(FailingEvaluatorHandle::new("evaluator-flaky"));
    let coordinator = GlobalBeamCoordinator::new(vec![handle.clone()]);
    let context = PortfolioContext {
        cash: Eur(10_000.0),
        as_of: chrono::Utc::now(),
        ..Default::default()
    };
    let batches: Vec<SequenceBatch> = (0..10).map(one_sequence_batch).collect();

    let result = coordinator
        .run(
            batches,
            &context,
            &EvaluationSettings::default(),
            &CoordinatorSettings {
                enable_early_termination: false,
                ..CoordinatorSettings::default()
            },
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(CoordinatorError::EvaluatorUnavailable { .. })));
    assert!(handle.calls.load(Ordering::Relaxed) >= 5, "breaker should have admitted at least the failure threshold's worth of calls");

    let snapshot = coordinator.breakers().snapshot().await;
    let (_, state) = snapshot
        .iter()
        .find(|(name, _)| name == "evaluator-flaky")
        .expect("the flaky evaluator should have a registered breaker");
    assert_eq!(*state, CircuitState::Open);
}
