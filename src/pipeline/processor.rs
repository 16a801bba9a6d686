//! Mapping orchestrator: one reference, one target, one tagged output.
//!
//! Single entry point that drives the full pipeline:
//! load → extract → segment → match → checkbox transfer → apply → save.
//!
//! Uses trait-based DI for the oracle and the document codec so the
//! processor stays fully testable with mock implementations. Only input
//! errors abort an item; everything downstream degrades and is reported.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::markup::extract::{checkboxes_from_scan, paragraphs_from_scan};
use crate::markup::{extract_tag_contexts, DocumentCodec, DocxCodec, MarkupError};
use crate::paragraph_cache::ParagraphCache;
use crate::pipeline::apply::Applicator;
use crate::pipeline::candidates::PositionModel;
use crate::pipeline::checkbox::{CheckboxTransferer, TransferInput};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::matching::{MatchingOrchestrator, MatchingRequest};
use crate::pipeline::oracle::SemanticOracle;
use crate::pipeline::report::{DebugReport, Fingerprints, MappingReport, ReportInput, SegmentationDebug};
use crate::pipeline::segmentation::{should_segment, SegmentationSignals, Segmenter};
use crate::pipeline_config::{MappingConfig, MappingOptions, SegmentationMode};

const OUTPUT_SUFFIX: &str = "_tagged.docx";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that abort one item. The batch moves on to the next.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("{role} document is missing: {detail}")]
    MissingInput { role: &'static str, detail: String },

    #[error("{role} document is invalid: {source}")]
    InvalidDocument {
        role: &'static str,
        #[source]
        source: MarkupError,
    },

    #[error("Reference document contains no placeholders")]
    NoPlaceholders,

    #[error("Failed to serialise the tagged document: {0}")]
    Output(#[source] MarkupError),
}

// ---------------------------------------------------------------------------
// Request and result types
// ---------------------------------------------------------------------------

/// A document handed over by the host, on disk or already in memory.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    Path(PathBuf),
    Buffer { name: String, bytes: Vec<u8> },
}

impl DocumentInput {
    /// File name used for output naming.
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Buffer { name, .. } => name.clone(),
        }
    }

    fn load(&self, role: &'static str) -> Result<Cow<'_, [u8]>, ProcessingError> {
        let bytes = match self {
            Self::Path(path) => Cow::Owned(std::fs::read(path).map_err(|e| ProcessingError::MissingInput {
                role,
                detail: format!("{}: {e}", path.display()),
            })?),
            Self::Buffer { bytes, .. } => Cow::Borrowed(bytes.as_slice()),
        };
        if bytes.is_empty() {
            return Err(ProcessingError::MissingInput {
                role,
                detail: "empty buffer".into(),
            });
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone)]
pub struct MappingRequest {
    pub reference: DocumentInput,
    pub target: DocumentInput,
    pub options: MappingOptions,
}

/// Tagged document plus its report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedItem {
    pub output_name: String,
    #[serde(skip)]
    pub output_bytes: Vec<u8>,
    pub report: MappingReport,
}

/// `output_name` option, else `<target stem>_tagged.docx`.
pub fn output_name(options: &MappingOptions, target_name: &str) -> String {
    if let Some(name) = options.output_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    let stem = Path::new(target_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}{OUTPUT_SUFFIX}")
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Processor {
    config: MappingConfig,
    oracle: Option<Box<dyn SemanticOracle>>,
    codec: Box<dyn DocumentCodec>,
}

impl Processor {
    /// Processor over `.docx` packages. `None` runs the pattern cascade only.
    pub fn new(config: MappingConfig, oracle: Option<Box<dyn SemanticOracle>>) -> Self {
        Self {
            config,
            oracle,
            codec: Box::new(DocxCodec),
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Map one reference onto one target.
    ///
    /// `cache` is cleared on entry and again on return, whatever the outcome.
    pub fn process_item(
        &self,
        request: &MappingRequest,
        cache: &mut ParagraphCache,
    ) -> Result<ProcessedItem, ProcessingError> {
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!("process_item", run_id = %run_id).entered();
        let mut cache = cache.scope();

        let reference_bytes = request.reference.load("reference")?;
        let target_bytes = request.target.load("target")?;
        let fingerprints = Fingerprints::of(&reference_bytes, &target_bytes);

        let reference_tree = self
            .codec
            .open(&reference_bytes)
            .map_err(|source| ProcessingError::InvalidDocument { role: "reference", source })?;
        let target_tree = self
            .codec
            .open(&target_bytes)
            .map_err(|source| ProcessingError::InvalidDocument { role: "target", source })?;

        let contexts = extract_tag_contexts(&reference_tree);
        if contexts.is_empty() {
            return Err(ProcessingError::NoPlaceholders);
        }

        let reference_scan = reference_tree.scan();
        let target_scan = target_tree.scan();
        let paragraphs = cache.get_or_extract(&fingerprints.target_sha256, || paragraphs_from_scan(&target_scan));
        tracing::info!(
            tags = contexts.len(),
            reference_paragraphs = reference_scan.paragraphs.len(),
            target_paragraphs = paragraphs.len(),
            "Documents loaded"
        );

        let dump = if request.options.debug {
            DiagnosticDump::for_run(self.config.dump_dir.as_deref(), &run_id)
        } else {
            None
        };
        if let Some(d) = &dump {
            d.json("inputs", &serde_json::json!({ "contexts": &contexts, "fingerprints": &fingerprints }));
        }

        // ── Segmentation ──
        let segment = match request.options.segmentation {
            SegmentationMode::Always => true,
            SegmentationMode::Never => false,
            SegmentationMode::Auto => should_segment(
                SegmentationSignals::measure(paragraphs, &contexts),
                &self.config.segmentation,
            ),
        };
        let segmentation =
            segment.then(|| Segmenter::new(&self.config).segment(&reference_scan, &target_scan, &contexts));
        if let (Some(d), Some(s)) = (&dump, &segmentation) {
            d.json("segmentation", s);
        }

        // ── Matching ──
        let oracle = self.oracle.as_deref();
        let matched = MatchingOrchestrator::new(oracle, &self.config, dump.as_ref()).run(&MatchingRequest {
            contexts: &contexts,
            paragraphs,
            positions: PositionModel::new(reference_scan.paragraphs.len(), paragraphs.len()),
            segmentation: segmentation.as_ref(),
        });

        // ── Checkboxes ──
        let reference_paragraphs = paragraphs_from_scan(&reference_scan);
        let reference_checkboxes = checkboxes_from_scan(&reference_scan);
        let target_checkboxes = checkboxes_from_scan(&target_scan);
        let checkboxes = CheckboxTransferer::new(oracle, &self.config, dump.as_ref()).transfer(
            request.options.checkbox_mode,
            &TransferInput {
                reference: &reference_checkboxes,
                reference_paragraphs: &reference_paragraphs,
                target: &target_checkboxes,
                target_paragraphs: paragraphs,
            },
        );

        // ── Application ──
        let applied = Applicator::new(&target_tree).apply(&matched.matches, &checkboxes.decisions);
        let output_bytes = self
            .codec
            .save(&target_bytes, &applied.tree)
            .map_err(ProcessingError::Output)?;

        let mut report = MappingReport::build(ReportInput {
            contexts: &contexts,
            matched: &matched,
            apply: &applied,
            checkboxes: &checkboxes,
            fingerprints,
        });
        if request.options.debug {
            report = report.with_debug(DebugReport {
                run_id,
                runs: matched.runs.clone(),
                checkbox_run: checkboxes.run.clone(),
                segmentation: segmentation.as_ref().map(SegmentationDebug::from_result),
                dump_dir: dump.as_ref().map(|d| d.dir().display().to_string()),
            });
        }
        if let Some(d) = &dump {
            d.json("report", &report);
        }

        tracing::info!(summary = %report.summary(), "Item processed");
        Ok(ProcessedItem {
            output_name: output_name(&request.options, &request.target.name()),
            output_bytes,
            report,
        })
    }

    /// Process every request in order; a failed item never stops the batch.
    pub fn process_batch(&self, requests: &[MappingRequest]) -> Vec<Result<ProcessedItem, ProcessingError>> {
        let _span = tracing::info_span!("process_batch", items = requests.len()).entered();
        let mut cache = ParagraphCache::from_config(&self.config);

        let results: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                let result = self.process_item(request, &mut cache);
                if let Err(e) = &result {
                    tracing::warn!(item = i, error = %e, "Item failed, continuing with the next one");
                }
                result
            })
            .collect();

        cache.clear();
        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(items = results.len(), failed, "Batch complete");
        results
    }
}
