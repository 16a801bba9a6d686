//! Cross-cutting checks on a candidate match set, whichever strategy produced it.
//!
//! Every problem becomes a `ValidationIssue`; nothing here returns an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::cell_groups::{cell_groups, share_cell};
use super::types::{MatchResult, ValidationIssue, ValidationRule};
use crate::markup::TagContext;
use crate::pipeline::candidates::keywords::{shared_count, significant_keywords};
use crate::pipeline::candidates::TargetView;
use crate::pipeline::checkbox::{CheckboxDecision, PairLink};
use crate::pipeline_config::MappingConfig;

/// Labels with fewer significant keywords than this are too short to judge.
const MIN_PLAUSIBILITY_KEYWORDS: usize = 2;

pub struct ValidationInput<'a> {
    pub contexts: &'a [TagContext],
    pub view: &'a TargetView<'a>,
    pub matches: &'a [MatchResult],
    pub checkboxes: &'a [CheckboxDecision],
    pub pairs: &'a [PairLink],
    /// Indices the oracle was allowed to answer with; `None` means the whole view.
    pub allowed_indices: Option<&'a BTreeSet<usize>>,
}

pub struct Validator<'c> {
    config: &'c MappingConfig,
}

impl<'c> Validator<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        index_range(input, &mut issues);
        collisions(input, &mut issues);
        cell_group_integrity(input, &mut issues);
        semantic_plausibility(input, &mut issues);
        self.coverage(input, &mut issues);
        checkbox_pairs(input, &mut issues);

        if !issues.is_empty() {
            tracing::debug!(
                issues = issues.len(),
                blocking = issues.iter().filter(|i| i.is_blocking()).count(),
                "Validation found issues"
            );
        }
        issues
    }

    fn coverage(&self, input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
        if input.contexts.is_empty() {
            return;
        }
        let matched: BTreeSet<&str> = input.matches.iter().map(|m| m.tag.as_str()).collect();
        let missing: Vec<&str> = input
            .contexts
            .iter()
            .map(|c| c.tag.as_str())
            .filter(|t| !matched.contains(t))
            .collect();
        let ratio = missing.len() as f32 / input.contexts.len() as f32;
        if ratio > self.config.coverage_floor {
            issues.push(ValidationIssue::advisory(
                ValidationRule::Coverage,
                format!(
                    "{} of {} tags are unmatched ({:.0}%): {}",
                    missing.len(),
                    input.contexts.len(),
                    ratio * 100.0,
                    missing.join(", ")
                ),
            ));
        }
    }
}

// ── Rule: answers must point into the listed paragraphs ──

fn index_range(input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
    for m in input.matches {
        let allowed = match input.allowed_indices {
            Some(allowed) => allowed.contains(&m.target_index),
            None => input.view.contains(m.target_index),
        };
        if !allowed {
            issues.push(ValidationIssue::blocking(
                ValidationRule::IndexRange,
                format!("Tag {} targets paragraph {}, which is not in the list.", m.tag, m.target_index),
                vec![m.tag.clone()],
            ));
        }
    }
}

// ── Rule 1: no accidental collision ──

fn collisions(input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
    let mut by_target: BTreeMap<usize, Vec<&MatchResult>> = BTreeMap::new();
    for m in input.matches {
        by_target.entry(m.target_index).or_default().push(m);
    }

    for (index, members) in by_target {
        if members.len() < 2 {
            continue;
        }
        if input.view.get(index).is_some_and(|p| p.is_table_cell) {
            continue;
        }
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if a.tag != b.tag && !share_cell(input.contexts, &a.tag, &b.tag) {
                    issues.push(ValidationIssue::blocking(
                        ValidationRule::Collision,
                        format!("Tags {} and {} both target paragraph {}; each needs its own place.", a.tag, b.tag, index),
                        vec![a.tag.clone(), b.tag.clone()],
                    ));
                }
            }
        }
    }
}

// ── Rule 2: cell-group integrity ──

fn cell_group_integrity(input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
    for group in cell_groups(input.contexts) {
        let targets: BTreeSet<usize> = input
            .matches
            .iter()
            .filter(|m| group.contains(&m.tag))
            .map(|m| m.target_index)
            .collect();
        if targets.len() > 1 {
            issues.push(ValidationIssue::blocking(
                ValidationRule::CellGroup,
                format!(
                    "Tags {} share one reference cell but were spread over paragraphs {:?}; put them in the same paragraph.",
                    group.tags.join(", "),
                    targets
                ),
                group.tags.clone(),
            ));
        }
    }
}

// ── Rule 3: semantic plausibility ──

fn semantic_plausibility(input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
    let contexts: HashMap<&str, &TagContext> = input.contexts.iter().map(|c| (c.tag.as_str(), c)).collect();

    for m in input.matches {
        let Some(context) = contexts.get(m.tag.as_str()) else {
            continue;
        };
        if context.table_position.is_some() {
            continue;
        }
        let label = significant_keywords(&context.label_before);
        if label.len() < MIN_PLAUSIBILITY_KEYWORDS {
            continue;
        }
        let Some(paragraph) = input.view.get(m.target_index) else {
            continue;
        };

        let mut text = paragraph.text.clone();
        if let Some(previous) = input.view.previous(paragraph.index).filter(|p| !p.is_blank()) {
            text.push(' ');
            text.push_str(&previous.text);
        }
        if paragraph.is_table_cell {
            text.push(' ');
            text.push_str(&input.view.slot_label(paragraph));
        }

        if shared_count(&label, &significant_keywords(&text)) == 0 {
            issues.push(ValidationIssue::blocking(
                ValidationRule::SemanticPlausibility,
                format!(
                    "Tag {} (label \"{}\") was placed on paragraph {} (\"{}\"), which shares no keyword with the label.",
                    m.tag,
                    context.label_before,
                    m.target_index,
                    crate::pipeline::candidates::sanitize::truncate_preview(&paragraph.text, 60)
                ),
                vec![m.tag.clone()],
            ));
        }
    }
}

// ── Rules 5 and 6: checkbox pairs ──

fn checkbox_pairs(input: &ValidationInput<'_>, issues: &mut Vec<ValidationIssue>) {
    for (i, link) in input.pairs.iter().enumerate() {
        let (yes, no) = link.final_states(input.checkboxes);
        if yes && no {
            issues.push(ValidationIssue::blocking(
                ValidationRule::CheckboxExclusivity,
                format!(
                    "Pair {} (checkboxes {} and {}): yes and no are both checked; exactly one may be.",
                    i + 1,
                    link.target.yes.index,
                    link.target.no.index
                ),
                Vec::new(),
            ));
            continue;
        }
        if let Some(expected) = link.reference_value {
            if yes != expected || no == expected {
                issues.push(ValidationIssue::blocking(
                    ValidationRule::CheckboxFidelity,
                    format!(
                        "Pair {} (checkboxes {} and {}): the reference answer is {}, so checkbox {} must be checked and {} unchecked.",
                        i + 1,
                        link.target.yes.index,
                        link.target.no.index,
                        if expected { "yes" } else { "no" },
                        if expected { link.target.yes.index } else { link.target.no.index },
                        if expected { link.target.no.index } else { link.target.yes.index },
                    ),
                    Vec::new(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{TagType, TargetParagraph};
    use crate::pipeline::checkbox::CheckboxPair;
    use crate::pipeline::fixtures::{cell, cell_context, checkbox, context, matched, paragraphs};
    use crate::pipeline::matching::InsertionPoint;

    fn run(
        contexts: &[TagContext],
        targets: &[TargetParagraph],
        matches: &[MatchResult],
        checkboxes: &[CheckboxDecision],
        pairs: &[PairLink],
    ) -> Vec<ValidationIssue> {
        let config = MappingConfig::default();
        let view = TargetView::new(targets);
        Validator::new(&config).validate(&ValidationInput {
            contexts,
            view: &view,
            matches,
            checkboxes,
            pairs,
            allowed_indices: None,
        })
    }

    fn rules(issues: &[ValidationIssue]) -> Vec<ValidationRule> {
        issues.iter().map(|i| i.rule).collect()
    }

    fn yes_no_link(reference_value: Option<bool>) -> PairLink {
        PairLink {
            target: CheckboxPair {
                yes: checkbox(2, 1, "Oui", false),
                no: checkbox(3, 1, "Non", false),
                value: None,
                question: "PME ?".into(),
            },
            reference_value,
        }
    }

    #[test]
    fn clean_match_set_has_no_issue() {
        let contexts = vec![context("SIRET", "Numéro SIRET :")];
        let targets = paragraphs(&["Numéro SIRET :", ""]);
        let issues = run(&contexts, &targets, &[matched("SIRET", 1, InsertionPoint::ReplaceEmpty)], &[], &[]);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn collision_on_plain_paragraph_is_blocking() {
        let contexts = vec![context("A", "Nom"), context("B", "Nom")];
        let targets = paragraphs(&["Nom :"]);
        let issues = run(
            &contexts,
            &targets,
            &[matched("A", 0, InsertionPoint::AfterColon), matched("B", 0, InsertionPoint::AfterColon)],
            &[],
            &[],
        );
        assert_eq!(rules(&issues), vec![ValidationRule::Collision]);
        assert!(issues[0].is_blocking());
        assert_eq!(issues[0].tags, vec!["A", "B"]);
    }

    #[test]
    fn shared_reference_cell_may_share_target() {
        let contexts = vec![
            cell_context("DATE_DEBUT", "Période", "", (0, 1, 1), TagType::Date),
            cell_context("DATE_FIN", "Période", "", (0, 1, 1), TagType::Date),
        ];
        let targets = paragraphs(&["Période du marché :"]);
        let issues = run(
            &contexts,
            &targets,
            &[matched("DATE_DEBUT", 0, InsertionPoint::Inline), matched("DATE_FIN", 0, InsertionPoint::Inline)],
            &[],
            &[],
        );
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn split_cell_group_is_blocking() {
        let contexts = vec![
            cell_context("DATE_DEBUT", "Période", "", (0, 1, 1), TagType::Date),
            cell_context("DATE_FIN", "Période", "", (0, 1, 1), TagType::Date),
        ];
        let targets = vec![cell(0, 0, 0, 0, "Période"), cell(1, 0, 0, 1, ""), cell(2, 0, 0, 2, "")];
        let issues = run(
            &contexts,
            &targets,
            &[matched("DATE_DEBUT", 1, InsertionPoint::TableCell), matched("DATE_FIN", 2, InsertionPoint::TableCell)],
            &[],
            &[],
        );
        assert_eq!(rules(&issues), vec![ValidationRule::CellGroup]);
    }

    #[test]
    fn implausible_placement_is_flagged() {
        let contexts = vec![context("ADRESSE", "Adresse du siège social")];
        let targets = paragraphs(&["Chiffre d'affaires annuel :", "Adresse du siège :"]);
        let issues = run(&contexts, &targets, &[matched("ADRESSE", 0, InsertionPoint::AfterColon)], &[], &[]);
        assert_eq!(rules(&issues), vec![ValidationRule::SemanticPlausibility]);
    }

    #[test]
    fn short_labels_are_not_judged() {
        let contexts = vec![context("NOM", "Nom :")];
        let targets = paragraphs(&["Chiffre d'affaires :"]);
        let issues = run(&contexts, &targets, &[matched("NOM", 0, InsertionPoint::AfterColon)], &[], &[]);
        assert!(issues.is_empty());
    }

    #[test]
    fn low_coverage_is_advisory() {
        let contexts = vec![context("A", "Nom"), context("B", "Adresse"), context("C", "Courriel")];
        let targets = paragraphs(&["Nom :"]);
        let issues = run(&contexts, &targets, &[matched("A", 0, InsertionPoint::AfterColon)], &[], &[]);
        assert_eq!(rules(&issues), vec![ValidationRule::Coverage]);
        assert!(!issues[0].is_blocking());
        assert!(issues[0].message.contains("B, C"));
    }

    #[test]
    fn index_outside_list_is_blocking() {
        let contexts = vec![context("A", "Nom")];
        let targets = paragraphs(&["Nom :"]);
        let issues = run(&contexts, &targets, &[matched("A", 40, InsertionPoint::Inline)], &[], &[]);
        assert!(rules(&issues).contains(&ValidationRule::IndexRange));
    }

    #[test]
    fn both_pair_members_checked_is_blocking() {
        let decisions = [
            CheckboxDecision { index: 2, checked: true },
            CheckboxDecision { index: 3, checked: true },
        ];
        let issues = run(&[], &[], &[], &decisions, &[yes_no_link(None)]);
        assert_eq!(rules(&issues), vec![ValidationRule::CheckboxExclusivity]);
        assert!(issues[0].is_blocking());
    }

    #[test]
    fn pair_must_follow_reference_value() {
        let wrong = [CheckboxDecision { index: 3, checked: true }];
        let issues = run(&[], &[], &[], &wrong, &[yes_no_link(Some(true))]);
        assert_eq!(rules(&issues), vec![ValidationRule::CheckboxFidelity]);

        let right = [CheckboxDecision { index: 2, checked: true }];
        assert!(run(&[], &[], &[], &right, &[yes_no_link(Some(true))]).is_empty());
        assert!(run(&[], &[], &[], &[], &[yes_no_link(None)]).is_empty());
    }
}
