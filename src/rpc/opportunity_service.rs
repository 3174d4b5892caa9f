//! `IdentifyOpportunities` (spec §6): a thin async wrapper around the
//! Opportunity Identifier (C1) that fits the RPC trait shape the other
//! three services share — a cancellation token in, a `tonic::Status` out.

use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::config::PlannerConfig;
use crate::model::Symbol;
use crate::opportunity::{CategorisedCandidates, OpportunityIdentifier, OpportunityInput};

use super::types::IdentifyOpportunitiesRequest;

#[tonic::async_trait]
pub trait OpportunityService: Send + Sync {
    async fn identify_opportunities(
        &self,
        request: IdentifyOpportunitiesRequest,
        cancellation: &CancellationToken,
    ) -> Result<CategorisedCandidates, Status>;
}

pub struct OpportunityServiceImpl {
    identifier: OpportunityIdentifier,
    config: PlannerConfig,
}

impl OpportunityServiceImpl {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            identifier: OpportunityIdentifier::new(),
            config,
        }
    }
}

#[tonic::async_trait]
impl OpportunityService for OpportunityServiceImpl {
    async fn identify_opportunities(
        &self,
        request: IdentifyOpportunitiesRequest,
        cancellation: &CancellationToken,
    ) -> Result<CategorisedCandidates, Status> {
        if cancellation.is_cancelled() {
            return Err(Status::cancelled("request cancelled before opportunity identification"));
        }
        let target_weights = request
            .target_weights
            .as_ref()
            .map(|map| map.iter().map(|(k, v)| (Symbol::from(k.as_str()), *v)).collect());
        let recently_sold: Vec<Symbol> = request.recently_sold.iter().map(|s| Symbol::from(s.as_str())).collect();
        let ineligible: Vec<Symbol> = request.ineligible_symbols.iter().map(|s| Symbol::from(s.as_str())).collect();

        let input = OpportunityInput {
            context: &request.context,
            available_cash: crate::model::Eur(request.available_cash),
            target_weights: target_weights.as_ref(),
            recently_sold: &recently_sold,
            ineligible_symbols: &ineligible,
            as_of: request.as_of,
        };
        Ok(self.identifier.identify(&input, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IdentifyOpportunitiesRequest {
        IdentifyOpportunitiesRequest {
            context: crate::model::PortfolioContext {
                cash: crate::model::Eur(10_000.0),
                as_of: chrono::Utc::now(),
                ..Default::default()
            },
            available_cash: 10_000.0,
            target_weights: None,
            recently_sold: Vec::new(),
            ineligible_symbols: Vec::new(),
            as_of: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn an_empty_universe_yields_no_categorised_candidates() {
        let service = OpportunityServiceImpl::new(PlannerConfig::default());
        let result = service
            .identify_opportunities(request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_count(), 0);
    }

    #[tokio::test]
    async fn a_cancelled_token_is_rejected_before_identification() {
        let service = OpportunityServiceImpl::new(PlannerConfig::default());
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = service.identify_opportunities(request(), &cancellation).await;
        assert!(matches!(result, Err(status) if status.code() == tonic::Code::Cancelled));
    }
}
