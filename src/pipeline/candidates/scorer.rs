//! Keyword-overlap scorer: the last step of the pattern cascade, the source
//! of prompt hints and the semantic filler used when the oracle loop gives up.

use std::collections::{BTreeSet, HashSet};

use super::keywords::{overlap, significant_keywords};
use super::view::TargetView;
use crate::markup::{TagContext, TargetParagraph};
use crate::pipeline::matching::InsertionPoint;
use crate::pipeline_config::MappingConfig;

const COLON_BONUS: f32 = 0.15;
const SECTION_BONUS: f32 = 0.15;
const STRUCTURE_BONUS: f32 = 0.10;
const PROXIMITY_BONUS: f32 = 0.10;
/// Small preference for an empty slot over its label paragraph.
const SLOT_BONUS: f32 = 0.05;
/// Weight of `label_after` when `label_before` carries no keyword.
const AFTER_LABEL_WEIGHT: f32 = 0.6;

/// Maps a reference paragraph index to the expected target index by relative position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionModel {
    pub reference_total: usize,
    pub target_total: usize,
}

impl PositionModel {
    pub fn new(reference_total: usize, target_total: usize) -> Self {
        Self {
            reference_total,
            target_total,
        }
    }

    pub fn expected(&self, reference_index: usize) -> usize {
        if self.reference_total == 0 || self.target_total == 0 {
            return 0;
        }
        let ratio = reference_index as f64 / self.reference_total as f64;
        ((ratio * self.target_total as f64).round() as usize).min(self.target_total - 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub target_index: usize,
    pub score: f32,
    pub insertion_point: InsertionPoint,
}

pub struct KeywordScorer<'c> {
    config: &'c MappingConfig,
}

impl<'c> KeywordScorer<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    /// Best unused paragraph for `context`, whatever its score.
    pub fn best(
        &self,
        context: &TagContext,
        view: &TargetView<'_>,
        positions: &PositionModel,
        used: &HashSet<usize>,
    ) -> Option<Candidate> {
        let (label, weight) = label_keywords(context)?;
        let expected = positions.expected(context.paragraph_index);

        view.iter()
            .filter(|p| !used.contains(&p.index) && !p.has_existing_tag)
            .filter_map(|p| self.score(context, &label, weight, p, view, expected))
            .max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| distance(b.target_index, expected).cmp(&distance(a.target_index, expected)))
                    .then_with(|| b.target_index.cmp(&a.target_index))
            })
    }

    /// Best candidate if it clears the configured floor.
    pub fn accepted(
        &self,
        context: &TagContext,
        view: &TargetView<'_>,
        positions: &PositionModel,
        used: &HashSet<usize>,
    ) -> Option<Candidate> {
        self.best(context, view, positions, used)
            .filter(|c| c.score >= self.config.pattern_score_floor)
    }

    fn score(
        &self,
        context: &TagContext,
        label: &BTreeSet<String>,
        weight: f32,
        paragraph: &TargetParagraph,
        view: &TargetView<'_>,
        expected: usize,
    ) -> Option<Candidate> {
        let (text, insertion_point, colon, slot) = if paragraph.is_table_cell {
            let insertion = if paragraph.is_blank() {
                InsertionPoint::TableCell
            } else if paragraph.ends_with_colon() {
                InsertionPoint::AfterColon
            } else {
                InsertionPoint::Inline
            };
            (view.slot_label(paragraph), insertion, paragraph.ends_with_colon(), paragraph.is_blank())
        } else if paragraph.is_blank() {
            // Only the blank paragraph right after a label is a slot.
            let previous = view.previous(paragraph.index).filter(|p| !p.is_blank())?;
            (
                previous.text.clone(),
                InsertionPoint::ReplaceEmpty,
                previous.ends_with_colon(),
                true,
            )
        } else if paragraph.ends_with_colon() {
            (paragraph.text.clone(), InsertionPoint::AfterColon, true, false)
        } else {
            (paragraph.text.clone(), InsertionPoint::Inline, false, false)
        };

        let shared = overlap(label, &significant_keywords(&text));
        if shared <= 0.0 {
            return None;
        }

        let mut score = shared * weight;
        if colon {
            score += COLON_BONUS;
        }
        if context.section.is_some() && context.section == paragraph.section {
            score += SECTION_BONUS;
        }
        if context.table_position.is_some() == paragraph.is_table_cell {
            score += STRUCTURE_BONUS;
        }
        if distance(paragraph.index, expected) <= self.config.label_proximity_window {
            score += PROXIMITY_BONUS;
        }
        if slot {
            score += SLOT_BONUS;
        }

        Some(Candidate {
            target_index: paragraph.index,
            score,
            insertion_point,
        })
    }
}

/// Keywords the tag is judged by, with their weight.
fn label_keywords(context: &TagContext) -> Option<(BTreeSet<String>, f32)> {
    let before = significant_keywords(&context.label_before);
    if !before.is_empty() {
        return Some((before, 1.0));
    }
    let after = significant_keywords(&context.label_after);
    if !after.is_empty() {
        return Some((after, AFTER_LABEL_WEIGHT));
    }
    None
}

pub(crate) fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::{cell, cell_context, context, paragraph, paragraphs};
    use crate::markup::TagType;

    #[test]
    fn expected_position_scales_relative_index() {
        let model = PositionModel::new(100, 50);
        assert_eq!(model.expected(0), 0);
        assert_eq!(model.expected(50), 25);
        assert_eq!(model.expected(99), 49);
        assert_eq!(PositionModel::new(0, 10).expected(3), 0);
    }

    #[test]
    fn blank_slot_after_label_beats_label_itself() {
        let config = MappingConfig::default();
        let scorer = KeywordScorer::new(&config);
        let targets = paragraphs(&["Objet", "Adresse du siège :", "", "Téléphone :"]);
        let view = TargetView::new(&targets);

        let best = scorer
            .best(&context("ADRESSE", "Adresse du siège :"), &view, &PositionModel::new(4, 4), &HashSet::new())
            .unwrap();
        assert_eq!(best.target_index, 2);
        assert_eq!(best.insertion_point, InsertionPoint::ReplaceEmpty);
    }

    #[test]
    fn colon_label_without_slot_gets_after_colon() {
        let config = MappingConfig::default();
        let scorer = KeywordScorer::new(&config);
        let targets = paragraphs(&["Nom du mandataire :", "Fonction du mandataire :"]);
        let view = TargetView::new(&targets);

        let best = scorer
            .accepted(&context("FONCTION", "Fonction"), &view, &PositionModel::new(2, 2), &HashSet::new())
            .unwrap();
        assert_eq!(best.target_index, 1);
        assert_eq!(best.insertion_point, InsertionPoint::AfterColon);
    }

    #[test]
    fn used_and_tagged_paragraphs_are_skipped() {
        let config = MappingConfig::default();
        let scorer = KeywordScorer::new(&config);
        let mut targets = paragraphs(&["Adresse :", "Adresse de facturation :"]);
        targets[1].has_existing_tag = true;
        let view = TargetView::new(&targets);
        let used: HashSet<usize> = [0].into_iter().collect();

        assert!(scorer
            .best(&context("ADRESSE", "Adresse"), &view, &PositionModel::new(2, 2), &used)
            .is_none());
    }

    #[test]
    fn no_shared_keyword_means_no_candidate() {
        let config = MappingConfig::default();
        let scorer = KeywordScorer::new(&config);
        let targets = vec![paragraph(0, "Chiffre d'affaires")];
        let view = TargetView::new(&targets);
        assert!(scorer
            .best(&context("EMAIL", "Courriel"), &view, &PositionModel::new(1, 1), &HashSet::new())
            .is_none());
    }

    #[test]
    fn blank_cell_scored_by_headers() {
        let config = MappingConfig::default();
        let scorer = KeywordScorer::new(&config);
        let targets = vec![
            cell(0, 0, 0, 0, ""),
            cell(1, 0, 0, 1, "Montant"),
            cell(2, 0, 1, 0, "Effectif moyen"),
            cell(3, 0, 1, 1, ""),
        ];
        let view = TargetView::new(&targets);
        let ctx = cell_context("EFFECTIF", "Effectif moyen annuel", "Valeur", (0, 1, 1), TagType::TableCell);

        let best = scorer.accepted(&ctx, &view, &PositionModel::new(4, 4), &HashSet::new()).unwrap();
        assert_eq!(best.target_index, 3);
        assert_eq!(best.insertion_point, InsertionPoint::TableCell);
    }
}
