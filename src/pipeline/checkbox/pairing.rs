//! Yes/no pair detection and naming of standalone checkboxes.

use std::collections::{HashMap, HashSet};

use super::types::{CheckboxPair, PairDetection, StandaloneCheckbox};
use crate::markup::tree::is_checkbox_glyph;
use crate::markup::{ExtractedCheckbox, TargetParagraph};
use crate::pipeline::candidates::keywords::tokens;

const MAX_TAG_WORDS: usize = 4;

/// Folded label tokens joined by single spaces.
pub fn normalize_label(label: &str) -> String {
    tokens(label).join(" ")
}

/// `Some(true)` for a yes label, `Some(false)` for a no label.
///
/// The first word decides, so "Oui, sous-traitance" is a yes.
pub fn polarity(label: &str) -> Option<bool> {
    let normalized = normalize_label(label);
    match normalized.split(' ').next()? {
        "oui" | "yes" => Some(true),
        "non" | "no" => Some(false),
        _ => None,
    }
}

/// Pair yes/no boxes within `window` paragraphs of each other; everything
/// else is standalone.
pub fn detect_pairs(checkboxes: &[ExtractedCheckbox], paragraphs: &[TargetParagraph], window: usize) -> PairDetection {
    let mut paired: HashSet<usize> = HashSet::new();
    let mut pairs = Vec::new();

    for (i, first) in checkboxes.iter().enumerate() {
        if paired.contains(&i) {
            continue;
        }
        let Some(first_polarity) = polarity(&first.label) else {
            continue;
        };
        let partner = checkboxes
            .iter()
            .enumerate()
            .skip(i + 1)
            .take_while(|(_, c)| c.paragraph_index.abs_diff(first.paragraph_index) <= window)
            .find(|(j, c)| !paired.contains(j) && polarity(&c.label) == Some(!first_polarity));
        let Some((j, second)) = partner else {
            continue;
        };

        paired.insert(i);
        paired.insert(j);
        let (yes, no) = if first_polarity { (first, second) } else { (second, first) };
        pairs.push(CheckboxPair {
            yes: yes.clone(),
            no: no.clone(),
            value: CheckboxPair::resolve(yes.checked, no.checked),
            question: question_for(first, second, checkboxes, paragraphs),
        });
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let standalone = checkboxes
        .iter()
        .enumerate()
        .filter(|(i, _)| !paired.contains(i))
        .map(|(_, c)| {
            let base = standalone_tag(&c.label, c.index);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            let tag = if *count == 1 { base } else { format!("{base}_{count}") };
            StandaloneCheckbox { checkbox: c.clone(), tag }
        })
        .collect();

    PairDetection { pairs, standalone }
}

/// `CHK_` plus the first label words in upper case, or the ordinal when the
/// label is empty.
pub fn standalone_tag(label: &str, index: usize) -> String {
    let words: Vec<String> = tokens(label)
        .into_iter()
        .take(MAX_TAG_WORDS)
        .map(|w| w.to_uppercase())
        .collect();
    if words.is_empty() {
        format!("CHK_{index}")
    } else {
        format!("CHK_{}", words.join("_"))
    }
}

/// Text before the first mark of the line, else the nearest preceding
/// non-blank paragraph holding no checkbox.
fn question_for(
    first: &ExtractedCheckbox,
    second: &ExtractedCheckbox,
    checkboxes: &[ExtractedCheckbox],
    paragraphs: &[TargetParagraph],
) -> String {
    let line = first.paragraph_index.min(second.paragraph_index);
    if let Some(paragraph) = paragraphs.iter().find(|p| p.index == line) {
        let before = paragraph.text.split(is_checkbox_glyph).next().unwrap_or_default().trim();
        if !before.is_empty() && polarity(before).is_none() {
            return before.to_string();
        }
    }

    let checkbox_lines: HashSet<usize> = checkboxes.iter().map(|c| c.paragraph_index).collect();
    paragraphs
        .iter()
        .rev()
        .filter(|p| p.index < line)
        .find(|p| !p.is_blank() && !checkbox_lines.contains(&p.index))
        .map(|p| p.text.trim().to_string())
        .unwrap_or_default()
}
