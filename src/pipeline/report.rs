//! Structured outcome of one mapping invocation.
//!
//! Returned to the host next to the mutated document. Field names are
//! camelCase on the wire; `debug` is only present when requested.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::markup::TagContext;
use crate::pipeline::apply::{ApplyReport, FailedTag};
use crate::pipeline::checkbox::{CheckboxStats, CheckboxTransfer};
use crate::pipeline::matching::{MatchingMode, OrchestratedMatches, RunSummary};
use crate::pipeline::segmentation::{SegmentPair, SegmentationResult, SegmentationStats};

pub const NO_MATCH_REASON: &str = "no match found";

/// Hex SHA-256 of a buffer.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprints {
    pub reference_sha256: String,
    pub target_sha256: String,
}

impl Fingerprints {
    pub fn of(reference: &[u8], target: &[u8]) -> Self {
        Self {
            reference_sha256: fingerprint(reference),
            target_sha256: fingerprint(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPairView {
    pub reference: String,
    pub target: String,
    pub similarity: f32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationDebug {
    pub stats: SegmentationStats,
    pub pairs: Vec<SegmentPairView>,
    pub unmatched_tags: Vec<String>,
}

impl SegmentationDebug {
    pub fn from_result(result: &SegmentationResult) -> Self {
        let pairs = result
            .pairs
            .iter()
            .filter_map(|SegmentPair { reference, target, similarity }| {
                let reference = result.reference_segment(*reference)?;
                let target = result.target_segment(*target)?;
                Some(SegmentPairView {
                    reference: reference.label.clone(),
                    target: target.label.clone(),
                    similarity: *similarity,
                    tags: reference.tags.clone(),
                })
            })
            .collect();
        Self {
            stats: result.stats.clone(),
            pairs,
            unmatched_tags: result.unmatched_tags.clone(),
        }
    }
}

/// Present only when the caller asked for debug output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReport {
    pub run_id: Uuid,
    /// One entry per matching run, with its round-by-round issue history.
    pub runs: Vec<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkbox_run: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationDebug>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<String>,
}

impl DebugReport {
    pub fn total_iterations(&self) -> usize {
        self.runs.iter().map(|r| r.iterations).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingReport {
    pub tags_applied: usize,
    pub tags_failed: usize,
    pub applied: Vec<String>,
    pub failed: Vec<FailedTag>,
    pub missing: Vec<String>,
    pub checkbox_stats: CheckboxStats,
    pub mode: MatchingMode,
    pub warnings: Vec<String>,
    pub fingerprints: Fingerprints,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugReport>,
}

/// Everything the report is assembled from.
pub struct ReportInput<'a> {
    pub contexts: &'a [TagContext],
    pub matched: &'a OrchestratedMatches,
    pub apply: &'a ApplyReport,
    pub checkboxes: &'a CheckboxTransfer,
    pub fingerprints: Fingerprints,
}

impl MappingReport {
    pub fn build(input: ReportInput<'_>) -> Self {
        let placed: HashSet<&str> = input.matched.matches.iter().map(|m| m.tag.as_str()).collect();
        let missing: Vec<String> = input
            .contexts
            .iter()
            .filter(|c| !placed.contains(c.tag.as_str()))
            .map(|c| c.tag.clone())
            .collect();

        let mut failed = input.apply.failed.clone();
        failed.extend(missing.iter().map(|tag| FailedTag {
            tag: tag.clone(),
            reason: NO_MATCH_REASON.to_string(),
        }));

        let mut warnings: Vec<String> = input
            .matched
            .issues
            .iter()
            .map(|issue| issue.message.clone())
            .collect();
        warnings.extend(input.apply.warnings.iter().cloned());

        Self {
            tags_applied: input.apply.applied.len(),
            tags_failed: failed.len(),
            applied: input.apply.applied.clone(),
            failed,
            missing,
            checkbox_stats: input.checkboxes.stats.clone(),
            mode: input.matched.mode,
            warnings,
            fingerprints: input.fingerprints,
            generated_at: Utc::now(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: DebugReport) -> Self {
        self.debug = Some(debug);
        self
    }

    /// One-line human summary for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} failed, {} missing, {} checkbox(es) changed, mode {}",
            self.tags_applied,
            self.tags_failed,
            self.missing.len(),
            self.checkbox_stats.changed,
            self.mode
        )
    }
}
