//! Writes placeholders and checkbox states into the target markup.
//!
//! Every change is planned against one scan of the original XML and applied
//! in a single right-to-left pass. Text only ever goes into existing `w:t`
//! runs, or into a new run cloned from the paragraph's run properties when it
//! has none; paragraph and run property blocks are never touched.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::edits::{Edit, EditPlan};
use crate::markup::tree::{CheckboxEncoding, CheckboxNode, ParagraphNode, CHECKED_GLYPHS, UNCHECKED_GLYPH};
use crate::markup::xml::escape_text;
use crate::markup::{MarkupTree, TreeScan};
use crate::pipeline::checkbox::CheckboxDecision;
use crate::pipeline::matching::{InsertionPoint, MatchResult};

static LEGACY_CHECKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:checked(?:\s[^>]*)?/>").expect("valid regex"));

/// A tag that could not be written, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTag {
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub tree: MarkupTree,
    pub applied: Vec<String>,
    pub failed: Vec<FailedTag>,
    /// Checkboxes whose state was flipped.
    pub toggled: usize,
    pub warnings: Vec<String>,
}

pub fn placeholder(tag: &str) -> String {
    format!("{{{{{tag}}}}}")
}

/// Text made only of fill-in characters counts as empty for `replace_empty`.
fn is_filler(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || matches!(c, '_' | '.' | '…' | '-' | '–'))
}

pub struct Applicator<'t> {
    tree: &'t MarkupTree,
    scan: TreeScan,
}

impl<'t> Applicator<'t> {
    pub fn new(tree: &'t MarkupTree) -> Self {
        Self {
            tree,
            scan: tree.scan(),
        }
    }

    pub fn apply(&self, matches: &[MatchResult], decisions: &[CheckboxDecision]) -> ApplyReport {
        let mut plan = EditPlan::new();
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        let mut warnings = Vec::new();

        // One edit per paragraph: co-located tags (cell groups) are written together.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut by_paragraph: BTreeMap<usize, Vec<&MatchResult>> = BTreeMap::new();
        for m in matches {
            if !seen.insert(m.tag.as_str()) {
                failed.push(FailedTag {
                    tag: m.tag.clone(),
                    reason: "tag matched more than once".into(),
                });
                continue;
            }
            by_paragraph.entry(m.target_index).or_default().push(m);
        }

        for (index, group) in &by_paragraph {
            let tags: Vec<String> = group.iter().map(|m| m.tag.clone()).collect();
            let fail_all = |failed: &mut Vec<FailedTag>, reason: String| {
                failed.extend(tags.iter().map(|tag| FailedTag {
                    tag: tag.clone(),
                    reason: reason.clone(),
                }));
            };

            let Some(paragraph) = self.scan.paragraph(*index) else {
                fail_all(&mut failed, format!("target paragraph {index} does not exist"));
                continue;
            };
            let content = tags.iter().map(|t| placeholder(t)).collect::<Vec<_>>().join(" ");
            let edits = self.plan_paragraph(paragraph, group[0].insertion_point, &content);
            if edits.is_empty() {
                fail_all(&mut failed, format!("target paragraph {index} has no writable run"));
                continue;
            }
            let mut trial = plan.clone();
            if edits.into_iter().all(|e| trial.push(e)) {
                plan = trial;
                applied.extend(tags.iter().cloned());
            } else {
                fail_all(&mut failed, format!("target paragraph {index} overlaps another edit"));
            }
        }

        let mut toggled = 0;
        for decision in decisions {
            let Some(checkbox) = self.scan.checkboxes.iter().find(|c| c.ordinal == decision.index) else {
                warnings.push(format!("checkbox {} does not exist in the target", decision.index));
                continue;
            };
            if checkbox.checked == decision.checked {
                continue;
            }
            let edits = self.plan_checkbox(checkbox, decision.checked);
            let mut trial = plan.clone();
            if !edits.is_empty() && edits.into_iter().all(|e| trial.push(e)) {
                plan = trial;
                toggled += 1;
            } else {
                warnings.push(format!("checkbox {} could not be toggled", decision.index));
            }
        }

        for f in &failed {
            tracing::warn!(tag = %f.tag, reason = %f.reason, "Tag not applied");
        }
        tracing::info!(
            applied = applied.len(),
            failed = failed.len(),
            toggled,
            edits = plan.len(),
            "Edits applied to target"
        );

        ApplyReport {
            tree: MarkupTree::new(plan.apply(self.tree.xml())),
            applied,
            failed,
            toggled,
            warnings,
        }
    }

    fn plan_paragraph(&self, paragraph: &ParagraphNode, insertion: InsertionPoint, content: &str) -> Vec<Edit> {
        let escaped = escape_text(content);
        let replace = match insertion {
            InsertionPoint::ReplaceEmpty | InsertionPoint::TableCell => is_filler(&paragraph.text),
            InsertionPoint::AfterColon | InsertionPoint::Inline | InsertionPoint::Checkbox => false,
        };

        if paragraph.runs.is_empty() {
            return self.new_run(paragraph, &escaped);
        }

        if replace {
            // First run takes the placeholder, the others are emptied.
            return paragraph
                .runs
                .iter()
                .enumerate()
                .map(|(i, run)| Edit::replace(run.content_span.clone(), if i == 0 { escaped.clone() } else { String::new() }))
                .collect();
        }

        let Some(last) = paragraph.runs.last() else {
            return Vec::new();
        };
        let separator = if paragraph.text.ends_with(char::is_whitespace) || paragraph.text.is_empty() {
            ""
        } else {
            " "
        };
        vec![Edit::insert(last.content_span.end, format!("{separator}{escaped}"))]
    }

    /// A run for a paragraph that has none, styled like the paragraph's last run properties.
    fn new_run(&self, paragraph: &ParagraphNode, escaped: &str) -> Vec<Edit> {
        let properties = paragraph.run_properties.as_deref().unwrap_or_default();
        let run = format!(r#"<w:r>{properties}<w:t xml:space="preserve">{escaped}</w:t></w:r>"#);
        match paragraph.close_offset {
            Some(close) => vec![Edit::insert(close, run)],
            None => {
                // `<w:p/>` or `<w:p .../>`: reopen it around the run.
                let element = &self.tree.xml()[paragraph.span.clone()];
                let open = element.trim_end_matches('>').trim_end_matches('/').trim_end();
                vec![Edit::replace(paragraph.span.clone(), format!("{open}>{run}</w:p>"))]
            }
        }
    }

    fn plan_checkbox(&self, checkbox: &CheckboxNode, checked: bool) -> Vec<Edit> {
        let glyph = if checked { CHECKED_GLYPHS[0] } else { UNCHECKED_GLYPH };
        match checkbox.encoding {
            CheckboxEncoding::Glyph => vec![Edit::replace(checkbox.state_span.clone(), glyph.to_string())],
            CheckboxEncoding::ContentControl => {
                let mut edits = vec![Edit::replace(
                    checkbox.state_span.clone(),
                    format!(r#"<w14:checked w14:val="{}"/>"#, u8::from(checked)),
                )];
                if let Some(span) = &checkbox.glyph_span {
                    edits.push(Edit::replace(span.clone(), glyph.to_string()));
                }
                edits
            }
            CheckboxEncoding::LegacyField => {
                let element = &self.tree.xml()[checkbox.state_span.clone()];
                let without = LEGACY_CHECKED.replace_all(element, "");
                let Some(close) = without.rfind("</w:checkBox>") else {
                    return Vec::new();
                };
                let rewritten = format!(
                    r#"{}<w:checked w:val="{}"/>{}"#,
                    &without[..close],
                    u8::from(checked),
                    &without[close..]
                );
                vec![Edit::replace(checkbox.state_span.clone(), rewritten)]
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::fixtures::{body, cell_row, checkbox_content_control, legacy_checkbox, para, split_para, table};
    use crate::markup::{extract_checkboxes, extract_target_paragraphs, find_placeholders};
    use crate::pipeline::fixtures::matched;

    fn tree(parts: &[String]) -> MarkupTree {
        MarkupTree::new(body(parts))
    }

    fn texts(tree: &MarkupTree) -> Vec<String> {
        extract_target_paragraphs(tree).into_iter().map(|p| p.text).collect()
    }

    // ── insertion points ──

    #[test]
    fn after_colon_appends_with_a_space() {
        let target = tree(&[para("Numéro SIRET :")]);
        let report = Applicator::new(&target).apply(&[matched("SIRET", 0, InsertionPoint::AfterColon)], &[]);

        assert_eq!(report.applied, vec!["SIRET"]);
        assert_eq!(texts(&report.tree), vec!["Numéro SIRET : {{SIRET}}"]);
        // Paragraph and run properties survive.
        assert!(report.tree.xml().contains(r#"<w:jc w:val="left"/>"#));
        assert!(report.tree.xml().contains(r#"<w:sz w:val="20"/>"#));
    }

    #[test]
    fn replace_empty_fills_a_blank_paragraph_with_a_styled_run() {
        let target = tree(&[para("Numéro SIRET :"), para("")]);
        let report = Applicator::new(&target).apply(&[matched("SIRET", 1, InsertionPoint::ReplaceEmpty)], &[]);

        assert_eq!(texts(&report.tree), vec!["Numéro SIRET :", "{{SIRET}}"]);
        assert!(report.tree.xml().contains(r#"<w:spacing w:after="0"/>"#));
    }

    #[test]
    fn replace_empty_substitutes_filler_runs() {
        let target = tree(&[split_para(&["____", "____"])]);
        let report = Applicator::new(&target).apply(&[matched("NOM", 0, InsertionPoint::ReplaceEmpty)], &[]);

        assert_eq!(texts(&report.tree), vec!["{{NOM}}"]);
        assert_eq!(report.tree.xml().matches("<w:i/>").count(), 2);
    }

    #[test]
    fn replace_empty_on_real_text_appends_instead() {
        let target = tree(&[para("Dénomination")]);
        let report = Applicator::new(&target).apply(&[matched("NOM", 0, InsertionPoint::ReplaceEmpty)], &[]);
        assert_eq!(texts(&report.tree), vec!["Dénomination {{NOM}}"]);
    }

    #[test]
    fn self_closing_paragraph_is_reopened() {
        let target = tree(&[para("Nom :"), "<w:p/>".to_string()]);
        let report = Applicator::new(&target).apply(&[matched("NOM", 1, InsertionPoint::ReplaceEmpty)], &[]);
        assert_eq!(texts(&report.tree), vec!["Nom :", "{{NOM}}"]);
    }

    #[test]
    fn cell_group_is_written_once_into_the_cell() {
        let target = tree(&[table(&[cell_row(&["Période", ""])])]);
        let report = Applicator::new(&target).apply(
            &[
                matched("DATE_DEBUT", 1, InsertionPoint::TableCell),
                matched("DATE_FIN", 1, InsertionPoint::TableCell),
            ],
            &[],
        );

        assert_eq!(report.applied, vec!["DATE_DEBUT", "DATE_FIN"]);
        assert_eq!(texts(&report.tree), vec!["Période", "{{DATE_DEBUT}} {{DATE_FIN}}"]);
    }

    // ── failures ──

    #[test]
    fn failures_are_reported_and_do_not_stop_the_pass() {
        let target = tree(&[para("Nom :"), para("Ville :")]);
        let report = Applicator::new(&target).apply(
            &[
                matched("GHOST", 42, InsertionPoint::Inline),
                matched("NOM", 0, InsertionPoint::AfterColon),
                matched("NOM", 1, InsertionPoint::AfterColon),
                matched("VILLE", 1, InsertionPoint::AfterColon),
            ],
            &[],
        );

        assert_eq!(report.applied, vec!["NOM", "VILLE"]);
        let failed: Vec<(&str, &str)> = report.failed.iter().map(|f| (f.tag.as_str(), f.reason.as_str())).collect();
        assert_eq!(
            failed,
            vec![
                ("NOM", "tag matched more than once"),
                ("GHOST", "target paragraph 42 does not exist"),
            ]
        );
    }

    // ── checkboxes ──

    #[test]
    fn toggles_every_checkbox_encoding() {
        let target = tree(&[
            para("☐ Oui ☒ Non"),
            legacy_checkbox(false, "Marché public"),
            checkbox_content_control(true, "Autre"),
        ]);
        let decisions = [
            CheckboxDecision { index: 0, checked: true },
            CheckboxDecision { index: 1, checked: false },
            CheckboxDecision { index: 2, checked: true },
            CheckboxDecision { index: 3, checked: false },
        ];

        let report = Applicator::new(&target).apply(&[], &decisions);

        assert_eq!(report.toggled, 4);
        let states: Vec<bool> = extract_checkboxes(&report.tree).iter().map(|c| c.checked).collect();
        assert_eq!(states, vec![true, false, true, false]);
        assert!(report.tree.xml().contains('☐'));
    }

    #[test]
    fn unchanged_or_unknown_checkboxes_are_left_alone() {
        let target = tree(&[para("☒ Oui ☐ Non")]);
        let report = Applicator::new(&target).apply(
            &[],
            &[CheckboxDecision { index: 0, checked: true }, CheckboxDecision { index: 9, checked: true }],
        );
        assert_eq!(report.toggled, 0);
        assert_eq!(report.tree.xml(), target.xml());
        assert_eq!(report.warnings.len(), 1);
    }

    // ── round trip ──

    #[test]
    fn every_applied_tag_is_found_again() {
        let target = tree(&[
            para("Raison sociale :"),
            para(""),
            para("Adresse : "),
            table(&[cell_row(&["CA", ""])]),
            para("☐ PME"),
        ]);
        let matches = [
            matched("SOC_NOM", 1, InsertionPoint::ReplaceEmpty),
            matched("SOC_ADRESSE", 2, InsertionPoint::AfterColon),
            matched("CA_N1", 4, InsertionPoint::TableCell),
            matched("PME", 5, InsertionPoint::Checkbox),
        ];

        let report = Applicator::new(&target).apply(&matches, &[CheckboxDecision { index: 0, checked: true }]);

        let found: HashSet<String> = find_placeholders(&report.tree.scan()).into_iter().map(|h| h.tag).collect();
        for tag in &report.applied {
            assert!(found.contains(tag), "{tag} missing after apply");
        }
        assert_eq!(report.applied.len(), 4);
        assert_eq!(report.toggled, 1);
    }
}
