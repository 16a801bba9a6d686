//! Checkbox state transfer from the reference to the target.
//!
//! Deterministic mode copies resolved pair values and standalone states.
//! Content-aware mode lets the oracle decide pair states from the target's
//! text, through the same correction loop and validation as tag matches;
//! whatever the oracle does not settle falls back to the deterministic copy.

use std::collections::{HashMap, HashSet};

use super::pairing::detect_pairs;
use super::types::{CheckboxDecision, CheckboxPair, CheckboxStats, PairDetection, PairLink};
use crate::markup::{ExtractedCheckbox, TargetParagraph};
use crate::pipeline::candidates::keywords::{jaccard, significant_keywords};
use crate::pipeline::candidates::{PairPrompt, PositionModel};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::matching::{MatchingAgent, MatchingTask, RunSummary};
use crate::pipeline::oracle::SemanticOracle;
use crate::pipeline_config::{CheckboxMode, MappingConfig};

/// Both documents' checkboxes and the paragraphs their questions come from.
pub struct TransferInput<'a> {
    pub reference: &'a [ExtractedCheckbox],
    pub reference_paragraphs: &'a [TargetParagraph],
    pub target: &'a [ExtractedCheckbox],
    pub target_paragraphs: &'a [TargetParagraph],
}

#[derive(Debug, Clone, Default)]
pub struct CheckboxTransfer {
    pub decisions: Vec<CheckboxDecision>,
    pub links: Vec<PairLink>,
    pub stats: CheckboxStats,
    /// The oracle run, when content-aware mode consulted one.
    pub run: Option<RunSummary>,
}

pub struct CheckboxTransferer<'a> {
    oracle: Option<&'a dyn SemanticOracle>,
    config: &'a MappingConfig,
    dump: Option<&'a DiagnosticDump>,
}

impl<'a> CheckboxTransferer<'a> {
    pub fn new(
        oracle: Option<&'a dyn SemanticOracle>,
        config: &'a MappingConfig,
        dump: Option<&'a DiagnosticDump>,
    ) -> Self {
        Self { oracle, config, dump }
    }

    pub fn transfer(&self, mode: CheckboxMode, input: &TransferInput<'_>) -> CheckboxTransfer {
        let window = self.config.checkbox_pair_window;
        let reference = detect_pairs(input.reference, input.reference_paragraphs, window);
        let target = detect_pairs(input.target, input.target_paragraphs, window);
        let (links, unmatched) = link_pairs(&reference.pairs, &target.pairs);

        let mut stats = CheckboxStats {
            reference_checkboxes: input.reference.len(),
            target_checkboxes: input.target.len(),
            reference_pairs: reference.pairs.len(),
            target_pairs: target.pairs.len(),
            ambiguous: links.iter().filter(|l| l.reference_value.is_none()).count(),
            unmatched,
            ..Default::default()
        };

        let mut run = None;
        let mut decisions = match (mode, self.oracle) {
            (CheckboxMode::ContentAware, Some(oracle)) if !links.is_empty() => {
                let (decided, summary) = self.content_aware(oracle, &links, input.target_paragraphs);
                run = Some(summary);
                complete_with_reference(decided, &links)
            }
            (CheckboxMode::ContentAware, None) => {
                tracing::warn!("Content-aware checkbox transfer requested without an oracle, copying states");
                deterministic_pairs(&links)
            }
            _ => deterministic_pairs(&links),
        };
        decisions.extend(standalone_decisions(&reference, &target));

        let current: HashMap<usize, bool> = input.target.iter().map(|c| (c.index, c.checked)).collect();
        stats.transferred = decisions.len();
        stats.changed = decisions
            .iter()
            .filter(|d| current.get(&d.index).is_some_and(|checked| *checked != d.checked))
            .count();

        tracing::info!(
            reference_pairs = stats.reference_pairs,
            target_pairs = stats.target_pairs,
            transferred = stats.transferred,
            changed = stats.changed,
            ambiguous = stats.ambiguous,
            "Checkbox states transferred"
        );
        CheckboxTransfer {
            decisions,
            links,
            stats,
            run,
        }
    }

    fn content_aware(
        &self,
        oracle: &dyn SemanticOracle,
        links: &[PairLink],
        paragraphs: &[TargetParagraph],
    ) -> (Vec<CheckboxDecision>, RunSummary) {
        let prompts: Vec<PairPrompt> = links
            .iter()
            .map(|l| PairPrompt {
                question: l.target.question.clone(),
                yes_index: l.target.yes.index,
                no_index: l.target.no.index,
                reference_value: l.reference_value,
            })
            .collect();
        let positions = PositionModel::new(paragraphs.len(), paragraphs.len());
        let outcome = MatchingAgent::new(oracle, self.config, self.dump).run(&MatchingTask {
            label: "checkboxes",
            contexts: &[],
            paragraphs,
            positions: &positions,
            pair_links: links,
            pair_prompts: &prompts,
        });
        let summary = RunSummary::from_outcome("checkboxes", 0, &outcome);
        (outcome.checkboxes, summary)
    }
}

/// Link each target pair to the reference pair asking the same question:
/// best question-keyword overlap first, then document order for the rest.
/// Returns the links and the number of target pairs left without a partner.
pub fn link_pairs(reference: &[CheckboxPair], target: &[CheckboxPair]) -> (Vec<PairLink>, usize) {
    let mut assigned: Vec<Option<usize>> = vec![None; target.len()];
    let mut used: HashSet<usize> = HashSet::new();

    let reference_keywords: Vec<_> = reference.iter().map(|p| significant_keywords(&p.question)).collect();
    let mut scored: Vec<(f32, usize, usize)> = Vec::new();
    for (t, pair) in target.iter().enumerate() {
        let keywords = significant_keywords(&pair.question);
        for (r, reference_kw) in reference_keywords.iter().enumerate() {
            let score = jaccard(&keywords, reference_kw);
            if score > 0.0 {
                scored.push((score, t, r));
            }
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| (a.1, a.2).cmp(&(b.1, b.2))));
    for (_, t, r) in scored {
        if assigned[t].is_none() && !used.contains(&r) {
            assigned[t] = Some(r);
            used.insert(r);
        }
    }

    let mut spare = (0..reference.len()).filter(|r| !used.contains(r));
    for slot in assigned.iter_mut().filter(|s| s.is_none()) {
        *slot = spare.next();
    }

    let mut links = Vec::new();
    let mut unmatched = 0;
    for (pair, slot) in target.iter().zip(assigned) {
        match slot {
            Some(r) => links.push(PairLink {
                target: pair.clone(),
                reference_value: reference[r].value,
            }),
            None => unmatched += 1,
        }
    }
    (links, unmatched)
}

/// Copy resolved reference values; ambiguous pairs are left as they are.
fn deterministic_pairs(links: &[PairLink]) -> Vec<CheckboxDecision> {
    links
        .iter()
        .filter_map(|l| l.reference_value.map(|value| (l, value)))
        .flat_map(|(l, value)| {
            [
                CheckboxDecision {
                    index: l.target.yes.index,
                    checked: value,
                },
                CheckboxDecision {
                    index: l.target.no.index,
                    checked: !value,
                },
            ]
        })
        .collect()
}

/// Oracle decisions, plus the reference copy for pairs the oracle left out.
fn complete_with_reference(decided: Vec<CheckboxDecision>, links: &[PairLink]) -> Vec<CheckboxDecision> {
    let touched: HashSet<usize> = decided.iter().map(|d| d.index).collect();
    let missing: Vec<PairLink> = links
        .iter()
        .filter(|l| !touched.contains(&l.target.yes.index) && !touched.contains(&l.target.no.index))
        .cloned()
        .collect();
    let mut decisions = decided;
    decisions.extend(deterministic_pairs(&missing));
    decisions
}

/// Standalone boxes carry their state across by derived name.
fn standalone_decisions(reference: &PairDetection, target: &PairDetection) -> Vec<CheckboxDecision> {
    let by_tag: HashMap<&str, bool> = reference
        .standalone
        .iter()
        .map(|s| (s.tag.as_str(), s.checkbox.checked))
        .collect();
    target
        .standalone
        .iter()
        .filter_map(|s| {
            by_tag.get(s.tag.as_str()).map(|checked| CheckboxDecision {
                index: s.checkbox.index,
                checked: *checked,
            })
        })
        .collect()
}
