//! Segment-aware orchestration of matching runs.
//!
//! Segment pairs are matched first, each with its own tags against its own
//! target paragraphs. Whatever is left (tags of unpaired segments, segment
//! overflow, tags a segment run could not place) goes through the global
//! path over the paragraphs nobody claimed. Cell groups are reconciled on the
//! merged set so every path honours them.

use std::collections::HashSet;

use serde::Serialize;

use super::agent::{AgentOutcome, MatchingAgent, MatchingTask, RoundRecord};
use super::cell_groups::{reconcile, share_cell};
use super::types::{MatchResult, MatchSource, MatchingMode, ValidationIssue};
use super::validation::{ValidationInput, Validator};
use crate::markup::{TagContext, TargetParagraph};
use crate::pipeline::candidates::{PatternMatcher, PositionModel, TargetView};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::oracle::SemanticOracle;
use crate::pipeline::segmentation::SegmentationResult;
use crate::pipeline_config::MappingConfig;

pub struct MatchingRequest<'a> {
    pub contexts: &'a [TagContext],
    /// Target paragraphs of the whole document (from the request cache).
    pub paragraphs: &'a [TargetParagraph],
    pub positions: PositionModel,
    /// `None` runs the global path only.
    pub segmentation: Option<&'a SegmentationResult>,
}

/// Debug view of one matching run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub label: String,
    pub tags: usize,
    pub iterations: usize,
    pub accepted: bool,
    pub mode: MatchingMode,
    pub oracle_matches: usize,
    pub satisfaction: u8,
    pub rounds: Vec<RoundRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_error: Option<String>,
}

impl RunSummary {
    pub fn from_outcome(label: impl Into<String>, tags: usize, outcome: &AgentOutcome) -> Self {
        Self {
            label: label.into(),
            tags,
            iterations: outcome.state.iteration,
            accepted: outcome.accepted,
            mode: outcome.mode,
            oracle_matches: outcome.oracle_matches(),
            satisfaction: outcome.state.satisfaction,
            rounds: outcome.rounds.clone(),
            oracle_error: outcome.oracle_error.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratedMatches {
    pub matches: Vec<MatchResult>,
    pub mode: MatchingMode,
    pub runs: Vec<RunSummary>,
    /// Validation of the merged set over the whole document.
    pub issues: Vec<ValidationIssue>,
}

pub struct MatchingOrchestrator<'a> {
    oracle: Option<&'a dyn SemanticOracle>,
    config: &'a MappingConfig,
    dump: Option<&'a DiagnosticDump>,
}

impl<'a> MatchingOrchestrator<'a> {
    pub fn new(
        oracle: Option<&'a dyn SemanticOracle>,
        config: &'a MappingConfig,
        dump: Option<&'a DiagnosticDump>,
    ) -> Self {
        Self { oracle, config, dump }
    }

    pub fn run(&self, request: &MatchingRequest<'_>) -> OrchestratedMatches {
        let Some(oracle) = self.oracle else {
            tracing::info!(tags = request.contexts.len(), "No oracle configured, pattern cascade only");
            let matches = PatternMatcher::new(self.config).match_all(
                request.contexts,
                request.paragraphs,
                &request.positions,
            );
            return self.finish(request, matches, MatchingMode::PatternFallback, Vec::new());
        };
        let agent = MatchingAgent::new(oracle, self.config, self.dump);

        let mut merged: Vec<MatchResult> = Vec::new();
        let mut runs: Vec<RunSummary> = Vec::new();
        let mut segment_accepted = false;

        if let Some(segmentation) = request.segmentation {
            for pair in &segmentation.pairs {
                let (Some(reference), Some(target)) = (
                    segmentation.reference_segment(pair.reference),
                    segmentation.target_segment(pair.target),
                ) else {
                    continue;
                };

                let mut contexts: Vec<TagContext> = request
                    .contexts
                    .iter()
                    .filter(|c| reference.tags.contains(&c.tag))
                    .cloned()
                    .collect();
                if contexts.is_empty() {
                    continue;
                }
                if contexts.len() > self.config.max_tags_per_segment {
                    let overflow = contexts.split_off(self.config.max_tags_per_segment);
                    tracing::warn!(
                        segment = reference.id,
                        overflow = overflow.len(),
                        "Segment tag cap reached, overflow goes to the global path"
                    );
                }
                let paragraphs: Vec<TargetParagraph> = request
                    .paragraphs
                    .iter()
                    .filter(|p| target.contains_paragraph(p.index))
                    .cloned()
                    .collect();

                let label = format!("segment-{}", reference.id);
                let outcome = agent.run(&MatchingTask {
                    label: &label,
                    contexts: &contexts,
                    paragraphs: &paragraphs,
                    positions: &request.positions,
                    pair_links: &[],
                    pair_prompts: &[],
                });
                segment_accepted |= outcome.accepted;
                runs.push(RunSummary::from_outcome(label, contexts.len(), &outcome));
                claim(&mut merged, outcome.matches, request.contexts);
            }
        }

        let remaining: Vec<TagContext> = {
            let matched: HashSet<&str> = merged.iter().map(|m| m.tag.as_str()).collect();
            request
                .contexts
                .iter()
                .filter(|c| !matched.contains(c.tag.as_str()))
                .cloned()
                .collect()
        };
        if !remaining.is_empty() {
            let chunks: Vec<&[TagContext]> = remaining.chunks(self.config.max_tags_per_call.max(1)).collect();
            let chunk_count = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                let claimed: HashSet<usize> = merged.iter().map(|m| m.target_index).collect();
                let paragraphs: Vec<TargetParagraph> = request
                    .paragraphs
                    .iter()
                    .filter(|p| !claimed.contains(&p.index))
                    .cloned()
                    .collect();
                let label = if chunk_count == 1 {
                    "global".to_string()
                } else {
                    format!("global-{}", i + 1)
                };
                let outcome = agent.run(&MatchingTask {
                    label: &label,
                    contexts: chunk,
                    paragraphs: &paragraphs,
                    positions: &request.positions,
                    pair_links: &[],
                    pair_prompts: &[],
                });
                runs.push(RunSummary::from_outcome(label, chunk.len(), &outcome));
                claim(&mut merged, outcome.matches, request.contexts);
            }
        }

        let merged = reconcile(request.contexts, merged);
        let oracle_matches = merged.iter().filter(|m| m.source == MatchSource::Oracle).count();
        let all_accepted = !runs.is_empty() && runs.iter().all(|r| r.accepted);
        let mode = determine_mode(oracle_matches, segment_accepted, all_accepted);
        self.finish(request, merged, mode, runs)
    }

    fn finish(
        &self,
        request: &MatchingRequest<'_>,
        mut matches: Vec<MatchResult>,
        mode: MatchingMode,
        runs: Vec<RunSummary>,
    ) -> OrchestratedMatches {
        matches.sort_by(|a, b| a.target_index.cmp(&b.target_index).then_with(|| a.tag.cmp(&b.tag)));

        let view = TargetView::new(request.paragraphs);
        let issues = Validator::new(self.config).validate(&ValidationInput {
            contexts: request.contexts,
            view: &view,
            matches: &matches,
            checkboxes: &[],
            pairs: &[],
            allowed_indices: None,
        });
        if let Some(dump) = self.dump {
            dump.json("matches", &matches);
        }
        tracing::info!(
            tags = request.contexts.len(),
            matched = matches.len(),
            runs = runs.len(),
            mode = %mode,
            "Matching finished"
        );
        OrchestratedMatches {
            matches,
            mode,
            runs,
            issues,
        }
    }
}

/// Add `incoming` to `merged`, skipping tags already placed and paragraphs
/// already claimed by a tag outside the same reference cell.
fn claim(merged: &mut Vec<MatchResult>, incoming: Vec<MatchResult>, contexts: &[TagContext]) {
    for candidate in incoming {
        if merged.iter().any(|m| m.tag == candidate.tag) {
            continue;
        }
        let conflict = merged
            .iter()
            .find(|m| m.target_index == candidate.target_index && !share_cell(contexts, &m.tag, &candidate.tag));
        if let Some(owner) = conflict {
            tracing::debug!(
                tag = %candidate.tag,
                owner = %owner.tag,
                target = candidate.target_index,
                "Paragraph already claimed"
            );
            continue;
        }
        merged.push(candidate);
    }
}

fn determine_mode(oracle_matches: usize, segment_accepted: bool, all_accepted: bool) -> MatchingMode {
    if oracle_matches == 0 {
        MatchingMode::PatternFallback
    } else if segment_accepted {
        MatchingMode::SegmentedOracle
    } else if all_accepted {
        MatchingMode::Oracle
    } else {
        MatchingMode::Hybrid
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
