//! Pairing of reference segments with target segments.

use std::collections::HashSet;

use super::types::{Segment, SegmentKind, SegmentPair};
use crate::pipeline::candidates::keywords::jaccard;

const VOCABULARY_WEIGHT: f32 = 0.7;
const STRUCTURE_WEIGHT: f32 = 0.3;

/// Shared vocabulary plus structural shape, in `0.0..=1.0`.
pub fn similarity(reference: &Segment, target: &Segment) -> f32 {
    let structure = match (reference.kind, target.kind) {
        (SegmentKind::Table, SegmentKind::Table) => {
            if reference.column_count == target.column_count {
                1.0
            } else {
                0.4
            }
        }
        (SegmentKind::Section, SegmentKind::Section) | (SegmentKind::Page, SegmentKind::Page) => {
            if reference.label == target.label {
                1.0
            } else {
                0.4
            }
        }
        (SegmentKind::Preamble, SegmentKind::Preamble) => 1.0,
        (SegmentKind::Table, _) | (_, SegmentKind::Table) => 0.0,
        // Running text cut differently (preamble, section or page).
        _ => 0.25,
    };
    VOCABULARY_WEIGHT * jaccard(&reference.vocabulary, &target.vocabulary) + STRUCTURE_WEIGHT * structure
}

/// Greedy one-to-one pairing, best similarity first. Only reference segments
/// holding tags are paired; the tags of those left without a partner are
/// returned for the global path.
pub fn pair_segments(reference: &[Segment], target: &[Segment], floor: f32) -> (Vec<SegmentPair>, Vec<String>) {
    let mut candidates: Vec<SegmentPair> = reference
        .iter()
        .filter(|r| !r.tags.is_empty())
        .flat_map(|r| {
            target.iter().map(move |t| SegmentPair {
                reference: r.id,
                target: t.id,
                similarity: similarity(r, t),
            })
        })
        .filter(|p| p.similarity >= floor)
        .collect();
    candidates.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.reference.cmp(&b.reference))
            .then_with(|| a.target.cmp(&b.target))
    });

    let mut used_reference = HashSet::new();
    let mut used_target = HashSet::new();
    let mut pairs = Vec::new();
    for candidate in candidates {
        if used_reference.contains(&candidate.reference) || used_target.contains(&candidate.target) {
            continue;
        }
        used_reference.insert(candidate.reference);
        used_target.insert(candidate.target);
        pairs.push(candidate);
    }
    pairs.sort_by_key(|p| p.reference);

    let unmatched: Vec<String> = reference
        .iter()
        .filter(|r| !used_reference.contains(&r.id))
        .flat_map(|r| r.tags.iter().cloned())
        .collect();
    if !unmatched.is_empty() {
        tracing::debug!(tags = unmatched.len(), "Reference segments without a target counterpart");
    }
    (pairs, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::candidates::keywords::significant_keywords;

    fn segment(id: usize, kind: SegmentKind, label: &str, text: &str, tags: &[&str]) -> Segment {
        Segment {
            id,
            kind,
            label: label.into(),
            span: 0..0,
            paragraph_indices: vec![id],
            column_count: (kind == SegmentKind::Table).then_some(3),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            char_count: text.len(),
            vocabulary: significant_keywords(text),
        }
    }

    #[test]
    fn identical_sections_score_high() {
        let a = segment(0, SegmentKind::Section, "A", "Identification du candidat", &[]);
        let b = segment(0, SegmentKind::Section, "A", "Identification du candidat", &[]);
        assert!(similarity(&a, &b) > 0.99);
    }

    #[test]
    fn table_never_scores_structure_against_section() {
        let a = segment(0, SegmentKind::Table, "table 0", "Exercice Montant", &[]);
        let b = segment(0, SegmentKind::Section, "B", "Exercice Montant", &[]);
        assert!((similarity(&a, &b) - VOCABULARY_WEIGHT).abs() < 1e-4);
    }

    #[test]
    fn pages_pair_by_label_and_partly_with_running_text() {
        let a = segment(0, SegmentKind::Page, "page 2", "Lot maintenance", &[]);
        let b = segment(0, SegmentKind::Page, "page 2", "Lot maintenance", &[]);
        let c = segment(0, SegmentKind::Preamble, "preamble", "Lot maintenance", &[]);
        assert!(similarity(&a, &b) > 0.99);
        assert!((similarity(&a, &c) - (VOCABULARY_WEIGHT + STRUCTURE_WEIGHT * 0.25)).abs() < 1e-4);
    }

    #[test]
    fn pairs_one_to_one_and_reports_orphans() {
        let reference = vec![
            segment(0, SegmentKind::Section, "A", "Identification du candidat", &["SOC_NOM"]),
            segment(1, SegmentKind::Table, "table 0", "Chiffre affaires exercice", &["CA_N1"]),
            segment(2, SegmentKind::Section, "C", "Moyens humains effectifs", &["EFF"]),
        ];
        let target = vec![
            segment(0, SegmentKind::Section, "A", "Identification du candidat", &[]),
            segment(1, SegmentKind::Table, "table 0", "Chiffre affaires exercice", &[]),
        ];

        let (pairs, unmatched) = pair_segments(&reference, &target, 0.15);

        let pairs: Vec<(usize, usize)> = pairs.iter().map(|p| (p.reference, p.target)).collect();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
        assert_eq!(unmatched, vec!["EFF"]);
    }

    #[test]
    fn untagged_reference_segments_are_not_paired() {
        let reference = vec![segment(0, SegmentKind::Section, "A", "Identification", &[])];
        let target = vec![segment(0, SegmentKind::Section, "A", "Identification", &[])];
        let (pairs, unmatched) = pair_segments(&reference, &target, 0.15);
        assert!(pairs.is_empty());
        assert!(unmatched.is_empty());
    }
}
