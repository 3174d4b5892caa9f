//! The four RPC surfaces of spec §6 (`CreatePlan`, `EvaluateSequences`,
//! `GenerateSequences`, `IdentifyOpportunities`) plus the shared health
//! endpoint shape. See SPEC_FULL.md §C for why these are modelled as plain
//! async traits over `serde`-derived DTOs rather than `tonic`-generated
//! service stubs.

pub mod coordinator_service;
pub mod evaluator_service;
pub mod generator_service;
pub mod health;
pub mod opportunity_service;
pub mod types;

pub use coordinator_service::{CoordinatorService, PlannerService};
pub use evaluator_service::{EvaluatorService, EvaluatorServiceImpl};
pub use generator_service::{GeneratorService, GeneratorServiceImpl};
pub use opportunity_service::{OpportunityService, OpportunityServiceImpl};
pub use types::{
    CreatePlanRequest, CreatePlanResponse, CreatePlanStats, EvaluateSequencesRequest, EvaluateSequencesResponse,
    EvaluatorEndpoint, EvaluatorPoolConfig, GenerateSequencesRequest, HealthResponse, IdentifyOpportunitiesRequest,
    LoadBalancingStrategy, PortfolioSummary, PositionInput, SearchParameters, SecurityInput,
};
