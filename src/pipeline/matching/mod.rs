//! Oracle-assisted matching: the correction loop, its response parser, the
//! validation engine and the segment-aware orchestration around them.

pub mod types;
pub mod cell_groups;
pub mod parser;
pub mod validation;
pub mod correction;
pub mod agent;
pub mod orchestrator;

pub use types::*;
pub use cell_groups::{cell_groups, reconcile, share_cell, CellGroup};
pub use parser::{parse_matching_response, ParsedResponse};
pub use validation::{ValidationInput, Validator};
pub use correction::{build_correction, build_parse_correction};
pub use agent::{AgentOutcome, MatchingAgent, MatchingTask, RoundRecord};
pub use orchestrator::{MatchingOrchestrator, MatchingRequest, OrchestratedMatches, RunSummary};

use thiserror::Error;

/// Why an oracle answer could not be read. Never fatal: the loop asks again
/// or falls back to the pattern cascade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    #[error("No JSON object found in oracle response")]
    NoJson,

    #[error("Invalid JSON in oracle response: {0}")]
    Json(String),
}
