pub mod config;
pub mod pipeline_config;
pub mod paragraph_cache; // Request-scoped target paragraph cache
pub mod markup; // WordprocessingML collaborator
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use paragraph_cache::ParagraphCache;
pub use pipeline::{MappingReport, MappingRequest, ProcessedItem, ProcessingError, Processor};
pub use pipeline_config::{MappingConfig, MappingOptions};

/// Install the global subscriber: `RUST_LOG` if set, else the build's default
/// filter. Logs go to stderr so stdout stays clean for JSON output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
