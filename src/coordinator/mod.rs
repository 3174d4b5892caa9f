//! The Global Beam Coordinator (C4): fans a request out across an evaluator
//! pool, merges local top-K results into one global beam, and applies early
//! termination once the beam has plateaued (spec §4.5). Grounded on the
//! original system's `beam_coordinator.py`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::CoordinatorError;
use crate::evaluator::{EvaluationSettings, SequenceEvaluator};
use crate::generator::SequenceBatch;
use crate::model::{EvaluationResult, PortfolioContext};
use crate::resilience::CircuitBreakerRegistry;

/// One evaluator the coordinator can dispatch a batch to. A single process
/// deployment hands this a thin wrapper around an in-process
/// [`SequenceEvaluator`]; a distributed deployment hands this a `tonic`
/// client stub (spec §6 `EvaluatorService`) — the coordinator itself is
/// agnostic to which.
#[tonic::async_trait]
pub trait EvaluatorHandle: Send + Sync {
    /// A stable name used as the circuit breaker's registry key and in
    /// diagnostics; need not be unique across a process's lifetime but
    /// should be stable for one pool member.
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        sequences: &[crate::model::Sequence],
        context: &PortfolioContext,
        settings: &EvaluationSettings,
    ) -> Result<Vec<EvaluationResult>, Box<dyn std::error::Error + Send + Sync>>;
}

/// An in-process [`EvaluatorHandle`] running [`SequenceEvaluator`] directly,
/// for a single-process deployment or tests — never fails, so it always
/// satisfies a batch on its own.
pub struct LocalEvaluatorHandle {
    name: String,
    evaluator: SequenceEvaluator,
}

impl LocalEvaluatorHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evaluator: SequenceEvaluator::new(),
        }
    }
}

#[tonic::async_trait]
impl EvaluatorHandle for LocalEvaluatorHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        sequences: &[crate::model::Sequence],
        context: &PortfolioContext,
        settings: &EvaluationSettings,
    ) -> Result<Vec<EvaluationResult>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.evaluator.evaluate(sequences, context, settings))
    }
}

/// Early-termination and beam-merge controls (spec §4.5, §6 `CreatePlan`
/// request); the rest of the search's shape lives in [`EvaluationSettings`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub beam_width: usize,
    pub enable_early_termination: bool,
    pub min_batches_to_evaluate: u32,
    pub plateau_threshold: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            beam_width: 10,
            enable_early_termination: true,
            min_batches_to_evaluate: 2,
            plateau_threshold: 3,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &crate::config::PlannerConfig) -> Self {
        Self {
            beam_width: config.beam_width,
            enable_early_termination: config.enable_early_termination,
            min_batches_to_evaluate: config.min_batches_to_evaluate,
            plateau_threshold: config.plateau_threshold,
        }
    }
}

/// The outcome of a full coordinator run: the merged global beam plus how
/// many batches were actually consumed (for diagnostics / the plan's
/// metadata), and whether the run stopped early.
#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    pub beam: Vec<EvaluationResult>,
    pub batches_consumed: u64,
    pub stopped_early: bool,
}

impl CoordinatorOutcome {
    /// The single best sequence the search found, if any survived as
    /// feasible (spec §4.5 step 6).
    pub fn best(&self) -> Option<&EvaluationResult> {
        self.beam.iter().find(|result| result.feasible)
    }
}

/// Dispatches generator batches to a round-robin pool of evaluators, guarded
/// by a per-evaluator circuit breaker, merging into one global beam.
pub struct GlobalBeamCoordinator {
    evaluators: Vec<Arc<dyn EvaluatorHandle>>,
    breakers: CircuitBreakerRegistry,
    next: AtomicUsize,
}

impl GlobalBeamCoordinator {
    pub fn new(evaluators: Vec<Arc<dyn EvaluatorHandle>>) -> Self {
        Self {
            evaluators,
            breakers: CircuitBreakerRegistry::new(),
            next: AtomicUsize::new(0),
        }
    }

    /// The per-evaluator circuit breaker registry, shared across requests
    /// against this coordinator instance (spec §5: "circuit-breaker state
    /// is shared across requests per service name"); exposed read-only for
    /// health reporting (spec §6 health endpoint).
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Consumes `batches` in order, stopping early once the beam plateaus
    /// (spec §4.5 step 5). `cancellation` is checked between batches and
    /// also cancelled by this method on early termination, so a caller
    /// streaming batches from C2 can stop producing further work.
    #[instrument(skip_all, fields(total_batches = batches.len(), beam_width = settings.beam_width))]
    pub async fn run(
        &self,
        batches: Vec<SequenceBatch>,
        context: &PortfolioContext,
        eval_settings: &EvaluationSettings,
        settings: &CoordinatorSettings,
        cancellation: &CancellationToken,
    ) -> Result<CoordinatorOutcome, CoordinatorError> {
        let mut beam: Vec<EvaluationResult> = Vec::new();
        let mut best_score = f64::MIN;
        let mut plateau_batches = 0u32;
        let mut batches_consumed = 0u64;
        let mut stopped_early = false;

        for batch in batches {
            if cancellation.is_cancelled() {
                stopped_early = true;
                break;
            }
            batches_consumed += 1;

            let local = self.dispatch(&batch, context, eval_settings).await?;
            let (beam_grew, score_improved) = merge_beam(&mut beam, local, settings.beam_width, &mut best_score);

            if settings.enable_early_termination && batches_consumed as u32 >= settings.min_batches_to_evaluate {
                if beam_grew || score_improved {
                    plateau_batches = 0;
                } else {
                    plateau_batches += 1;
                }
                if plateau_batches >= settings.plateau_threshold {
                    debug!(batches_consumed, "beam plateaued, cancelling remaining batches");
                    cancellation.cancel();
                    stopped_early = true;
                    break;
                }
            }

            if !batch.more_available {
                break;
            }
        }

        Ok(CoordinatorOutcome {
            beam,
            batches_consumed,
            stopped_early,
        })
    }

    /// Sends `batch` to one evaluator chosen round-robin, guarded by that
    /// evaluator's circuit breaker. Individual evaluator failures are logged
    /// and treated as "no sequences from this batch" (spec §7); only when
    /// every evaluator in the pool is currently unavailable does this
    /// surface [`CoordinatorError::EvaluatorUnavailable`].
    async fn dispatch(
        &self,
        batch: &SequenceBatch,
        context: &PortfolioContext,
        eval_settings: &EvaluationSettings,
    ) -> Result<Vec<EvaluationResult>, CoordinatorError> {
        if self.evaluators.is_empty() {
            return Err(CoordinatorError::EvaluatorUnavailable {
                batch: batch.batch_number,
            });
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.evaluators.len();
        for offset in 0..self.evaluators.len() {
            let index = (start + offset) % self.evaluators.len();
            let handle = &self.evaluators[index];
            let breaker = self.breakers.get_or_create(handle.name()).await;

            let outcome = breaker
                .call(|| handle.evaluate(&batch.sequences, context, eval_settings))
                .await;

            match outcome {
                Ok(results) => return Ok(results),
                Err(err) => {
                    warn!(evaluator = handle.name(), batch = batch.batch_number, error = %err, "evaluator unavailable, trying next");
                }
            }
        }

        Err(CoordinatorError::EvaluatorUnavailable {
            batch: batch.batch_number,
        })
    }
}

/// Folds `incoming` into `beam`, keeping the top `beam_width` by
/// `total_score` descending. Returns `(beam_grew, best_score_improved)` for
/// the early-termination check: the spec's conjunctive rule ("not improved
/// _and_ no new entries") is only satisfied when neither is true.
fn merge_beam(beam: &mut Vec<EvaluationResult>, incoming: Vec<EvaluationResult>, beam_width: usize, best_score: &mut f64) -> (bool, bool) {
    let before_len = beam.len();
    beam.extend(incoming);
    beam.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(std::cmp::Ordering::Equal));
    beam.truncate(beam_width.max(1));

    let beam_grew = beam.len() > before_len;
    let new_best = beam.first().map(|r| r.total_score).unwrap_or(f64::MIN);
    let score_improved = new_best > *best_score;
    if score_improved {
        *best_score = new_best;
    }
    (beam_grew, score_improved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionCandidate, Eur, Side};

    fn batch(number: u64, sequences: Vec<crate::model::Sequence>, more_available: bool) -> SequenceBatch {
        SequenceBatch {
            batch_number: number,
            sequences,
            more_available,
        }
    }

    fn seq(symbol: &str, priority: f64) -> crate::model::Sequence {
        let mut candidate = ActionCandidate::new(Side::Buy, symbol, 1, Eur(10.0));
        candidate.priority = priority;
        crate::model::Sequence::try_new(vec![candidate]).unwrap()
    }

    #[tokio::test]
    async fn picks_the_best_sequence_across_batches() {
        let coordinator = GlobalBeamCoordinator::new(vec![Arc::new(LocalEvaluatorHandle::new("evaluator-1"))]);
        let context = PortfolioContext {
            cash: Eur(10_000.0),
            as_of: chrono::Utc::now(),
            ..Default::default()
        };
        let batches = vec![
            batch(0, vec![seq("A", 0.1)], true),
            batch(1, vec![seq("B", 0.9)], false),
        ];
        let outcome = coordinator
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
            .await
            .unwrap();
        assert_eq!(outcome.batches_consumed, 2);
        assert!(outcome.best().is_some());
    }

    #[tokio::test]
    async fn stops_early_once_the_beam_plateaus() {
        let coordinator = GlobalBeamCoordinator::new(vec![Arc::new(LocalEvaluatorHandle::new("evaluator-1"))]);
        let context = PortfolioContext {
            cash: Eur(10_000.0),
            as_of: chrono::Utc::now(),
            ..Default::default()
        };
        let batches: Vec<SequenceBatch> = (0..10).map(|i| batch(i, vec![seq("A", 0.5)], i < 9)).collect();
        let settings = CoordinatorSettings {
            min_batches_to_evaluate: 1,
            plateau_threshold: 2,
            ..CoordinatorSettings::default()
        };
        let outcome = coordinator
            .run(batches, &context, &EvaluationSettings::default(), &settings, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.stopped_early);
        assert!(outcome.batches_consumed < 10);
    }

    #[tokio::test]
    async fn empty_evaluator_pool_surfaces_evaluator_unavailable() {
        let coordinator = GlobalBeamCoordinator::new(vec![]);
        let context = PortfolioContext::default();
        let batches = vec![batch(0, vec![seq("A", 0.5)], false)];
        let result = coordinator
            .run(
                batches,
                &context,
                &EvaluationSettings::default(),
                &CoordinatorSettings::default(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(CoordinatorError::EvaluatorUnavailable { batch: 0 })));
    }
}
