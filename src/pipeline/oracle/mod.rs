pub mod types;
pub mod ollama;
pub mod mock;

pub use types::*;
pub use ollama::*;
pub use mock::*;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("No compatible model available")]
    NoModelAvailable,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Oracle not configured")]
    NotConfigured,
}
