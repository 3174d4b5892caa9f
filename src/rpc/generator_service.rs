//! `GenerateSequences` (spec §6), server-streamed: batches are produced
//! eagerly (the generator has no blocking I/O of its own, spec §4.3) and
//! pushed onto a bounded [`async_channel`], matching the teacher's own use
//! of `async-channel` for in-process streaming boundaries. The receiver end
//! doubles as the cancellation signal: dropping it, or cancelling the
//! token, stops the feeder task before it sends the next batch.

use async_channel::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::generator::{GeneratorContext, SequenceBatch, SequenceGenerator};

use super::types::GenerateSequencesRequest;

#[tonic::async_trait]
pub trait GeneratorService: Send + Sync {
    async fn generate_sequences(
        &self,
        request: GenerateSequencesRequest,
        cancellation: CancellationToken,
    ) -> Receiver<SequenceBatch>;
}

#[derive(Default)]
pub struct GeneratorServiceImpl {
    generator: SequenceGenerator,
}

impl GeneratorServiceImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl GeneratorService for GeneratorServiceImpl {
    async fn generate_sequences(
        &self,
        request: GenerateSequencesRequest,
        cancellation: CancellationToken,
    ) -> Receiver<SequenceBatch> {
        let (tx, rx) = async_channel::bounded(4);
        let opportunities = request.opportunities.clone();
        let context = request.context.clone();
        let settings = request.settings();
        let batches = self
            .generator
            .generate(&opportunities, &context, &settings, &GeneratorContext::default());

        tokio::spawn(async move {
            for batch in batches {
                if cancellation.is_cancelled() {
                    debug!("generator stream cancelled before all batches were sent");
                    break;
                }
                let more_available = batch.more_available;
                if tx.send(batch).await.is_err() {
                    break;
                }
                if !more_available {
                    break;
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::generator::CombinatorialSettings;
    use crate::model::PortfolioContext;
    use crate::opportunity::CategorisedCandidates;

    fn request() -> GenerateSequencesRequest {
        GenerateSequencesRequest {
            opportunities: CategorisedCandidates::default(),
            context: PortfolioContext::default(),
            combinatorial: CombinatorialSettings::from_config(&PlannerConfig::default(), 0.0),
            batch_size: 10,
            diversity_weight: 0.3,
            enable_correlation_aware: true,
            same_side_cooloff_days: 0,
        }
    }

    #[tokio::test]
    async fn an_empty_opportunity_set_yields_a_closed_empty_stream() {
        let service = GeneratorServiceImpl::new();
        let rx = service.generate_sequences(request(), CancellationToken::new()).await;
        assert!(rx.recv().await.is_err(), "no opportunities means no batches and the channel closes");
    }

    #[tokio::test]
    async fn a_pre_cancelled_token_stops_the_feeder_before_it_sends() {
        let service = GeneratorServiceImpl::new();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let rx = service.generate_sequences(request(), cancellation).await;
        assert!(rx.recv().await.is_err());
    }
}
