pub mod segmentation;
pub mod candidates;
pub mod oracle;
pub mod matching; // Matching loop, validation, correction, orchestration
pub mod checkbox;
pub mod apply;
pub mod report;
pub mod processor; // Reference → target mapping orchestrator
pub mod diagnostic; // Numbered run artifacts (TAGBRIDGE_DUMP_DIR or config)

#[cfg(test)]
pub(crate) mod fixtures;

pub use processor::{output_name, DocumentInput, MappingRequest, ProcessedItem, ProcessingError, Processor};
pub use report::MappingReport;
