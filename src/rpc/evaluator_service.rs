//! `EvaluateSequences` (spec §6): the RPC-facing wrapper around the
//! Sequence Evaluator (C3) that a distributed deployment's evaluator
//! process would expose. [`LocalEvaluatorHandle`] (in `coordinator`) is
//! what the Global Beam Coordinator actually dials for an in-process pool;
//! this trait is the shape a networked evaluator process implements.

use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::evaluator::SequenceEvaluator;

use super::types::{EvaluateSequencesRequest, EvaluateSequencesResponse};

#[tonic::async_trait]
pub trait EvaluatorService: Send + Sync {
    async fn evaluate_sequences(
        &self,
        request: EvaluateSequencesRequest,
        cancellation: &CancellationToken,
    ) -> Result<EvaluateSequencesResponse, Status>;
}

#[derive(Default)]
pub struct EvaluatorServiceImpl {
    evaluator: SequenceEvaluator,
}

impl EvaluatorServiceImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl EvaluatorService for EvaluatorServiceImpl {
    async fn evaluate_sequences(
        &self,
        request: EvaluateSequencesRequest,
        cancellation: &CancellationToken,
    ) -> Result<EvaluateSequencesResponse, Status> {
        if cancellation.is_cancelled() {
            return Err(Status::cancelled("request cancelled before sequence evaluation"));
        }
        let total_evaluated = request.sequences.len();
        let beam_width = request.settings.beam_width;
        let top_sequences = self
            .evaluator
            .evaluate(&request.sequences, &request.context, &request.settings);
        Ok(EvaluateSequencesResponse {
            top_sequences,
            total_evaluated,
            beam_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationSettings;
    use crate::model::{ActionCandidate, Eur, PortfolioContext, Sequence, Side};

    fn one_sequence() -> Sequence {
        Sequence::try_new(vec![ActionCandidate::new(Side::Buy, "ACME", 1, Eur(10.0))]).unwrap()
    }

    #[tokio::test]
    async fn evaluates_and_echoes_the_requested_beam_width() {
        let service = EvaluatorServiceImpl::new();
        let settings = EvaluationSettings {
            beam_width: 5,
            ..EvaluationSettings::default()
        };
        let request = EvaluateSequencesRequest {
            sequences: vec![one_sequence()],
            context: PortfolioContext {
                cash: Eur(10_000.0),
                as_of: chrono::Utc::now(),
                ..Default::default()
            },
            settings,
        };

        let response = service
            .evaluate_sequences(request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.total_evaluated, 1);
        assert_eq!(response.beam_width, 5);
    }

    #[tokio::test]
    async fn a_cancelled_token_is_rejected_before_evaluation() {
        let service = EvaluatorServiceImpl::new();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let request = EvaluateSequencesRequest {
            sequences: vec![one_sequence()],
            context: PortfolioContext::default(),
            settings: EvaluationSettings::default(),
        };

        let result = service.evaluate_sequences(request, &cancellation).await;
        assert!(matches!(result, Err(status) if status.code() == tonic::Code::Cancelled));
    }
}
