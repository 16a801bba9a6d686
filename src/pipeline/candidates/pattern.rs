//! Deterministic, oracle-free matcher.
//!
//! A priority cascade, each step claiming target paragraphs before the next:
//! (a) date-range cells, (b) multi-column table rows, (c) percentage cells,
//! (d) identification fields, (e) keyword scoring for everything left.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::keywords::{contains_phrase, overlap, significant_keywords, tokens};
use super::scorer::{distance, KeywordScorer, PositionModel};
use super::view::TargetView;
use crate::markup::{TablePosition, TagContext, TagType, TargetParagraph};
use crate::pipeline::matching::cell_groups::{cell_groups, reconcile};
use crate::pipeline::matching::{InsertionPoint, MatchResult, MatchSource};
use crate::pipeline_config::MappingConfig;

const DATE_RANGE_CONFIDENCE: f32 = 0.85;
const TABLE_ROW_CONFIDENCE: f32 = 0.8;
const PERCENT_CONFIDENCE: f32 = 0.8;
const IDENTITY_CONFIDENCE: f32 = 0.9;

/// Labels longer than this are sentences, not field labels.
const MAX_IDENTITY_LABEL_TOKENS: usize = 12;

struct IdentityField {
    /// Tokens of the tag name that reveal the field (`SOC_SIRET`).
    tag_hints: &'static [&'static str],
    /// Label phrases, folded.
    phrases: &'static [&'static str],
}

/// Most specific fields first: "adresse électronique" is an email, not an address.
const IDENTITY_FIELDS: &[IdentityField] = &[
    IdentityField {
        tag_hints: &["EMAIL", "MAIL", "COURRIEL"],
        phrases: &["adresse electronique", "courriel", "email", "mail"],
    },
    IdentityField {
        tag_hints: &["SIRET", "SIREN", "RCS", "TVA"],
        phrases: &["siret", "siren", "rcs", "tva"],
    },
    IdentityField {
        tag_hints: &["TEL", "TELEPHONE", "PHONE"],
        phrases: &["telephone", "tel"],
    },
    IdentityField {
        tag_hints: &["NOM", "RAISON", "DENOMINATION"],
        phrases: &["raison sociale", "denomination", "nom"],
    },
    IdentityField {
        tag_hints: &["ADRESSE", "ADDR", "SIEGE"],
        phrases: &["adresse", "siege"],
    },
];

#[derive(Default)]
struct Assignment {
    used: HashSet<usize>,
    done: HashSet<String>,
    matches: Vec<MatchResult>,
}

impl Assignment {
    fn assign(&mut self, tag: &str, target_index: usize, confidence: f32, insertion_point: InsertionPoint, reason: &str) {
        self.used.insert(target_index);
        self.done.insert(tag.to_string());
        self.matches.push(MatchResult {
            tag: tag.to_string(),
            target_index,
            confidence,
            insertion_point,
            reason: Some(reason.to_string()),
            source: MatchSource::Pattern,
        });
    }

    fn is_free(&self, paragraph: &TargetParagraph) -> bool {
        !self.used.contains(&paragraph.index) && !paragraph.has_existing_tag
    }
}

pub struct PatternMatcher<'c> {
    config: &'c MappingConfig,
}

impl<'c> PatternMatcher<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    /// Run the full cascade. The same inputs always give the same output.
    pub fn match_all(
        &self,
        contexts: &[TagContext],
        paragraphs: &[TargetParagraph],
        positions: &PositionModel,
    ) -> Vec<MatchResult> {
        let view = TargetView::new(paragraphs);
        let mut state = Assignment::default();

        self.date_ranges(contexts, &view, positions, &mut state);
        self.table_rows(contexts, &view, positions, &mut state);
        self.percentages(contexts, &view, positions, &mut state);
        self.identification(contexts, &view, positions, &mut state);
        self.keyword_scores(contexts, &view, positions, &mut state);

        tracing::debug!(
            tags = contexts.len(),
            matched = state.matches.len(),
            "Pattern cascade finished"
        );
        sorted(reconcile(contexts, state.matches))
    }

    /// Place only the tags missing from `existing`, with the keyword scorer,
    /// on paragraphs `existing` does not occupy.
    pub fn fill_unmatched(
        &self,
        contexts: &[TagContext],
        paragraphs: &[TargetParagraph],
        positions: &PositionModel,
        existing: &[MatchResult],
    ) -> Vec<MatchResult> {
        let view = TargetView::new(paragraphs);
        let mut state = Assignment {
            used: existing.iter().map(|m| m.target_index).collect(),
            done: existing.iter().map(|m| m.tag.clone()).collect(),
            matches: Vec::new(),
        };
        self.keyword_scores(contexts, &view, positions, &mut state);
        sorted(state.matches)
    }

    // ── (a) date ranges ─────────────────────────────────

    fn date_ranges(
        &self,
        contexts: &[TagContext],
        view: &TargetView<'_>,
        positions: &PositionModel,
        state: &mut Assignment,
    ) {
        for group in cell_groups(contexts) {
            let members: Vec<&TagContext> = contexts.iter().filter(|c| group.contains(&c.tag)).collect();
            if !members.iter().any(|c| c.tag_type == TagType::Date) {
                continue;
            }
            if members.iter().any(|c| state.done.contains(&c.tag)) {
                continue;
            }

            let label: BTreeSet<String> = members
                .iter()
                .flat_map(|c| {
                    significant_keywords(&c.label_before)
                        .into_iter()
                        .chain(significant_keywords(&c.label_after))
                })
                .collect();
            if label.is_empty() {
                continue;
            }
            let expected = positions.expected(members[0].paragraph_index);

            let best = view
                .iter()
                .filter(|p| p.is_table_cell && p.is_blank() && state.is_free(p))
                .filter_map(|p| {
                    let shared = overlap(&label, &significant_keywords(&view.slot_label(p)));
                    if shared <= 0.0 {
                        return None;
                    }
                    let same_column = p.table_position.map(|tp| tp.column) == Some(group.position.column);
                    let score = shared + if same_column { 0.1 } else { 0.0 };
                    Some((p.index, score))
                })
                .max_by(|a, b| {
                    a.1.total_cmp(&b.1)
                        .then_with(|| distance(b.0, expected).cmp(&distance(a.0, expected)))
                        .then_with(|| b.0.cmp(&a.0))
                });

            if let Some((index, _)) = best {
                for member in &members {
                    state.assign(
                        &member.tag,
                        index,
                        DATE_RANGE_CONFIDENCE,
                        InsertionPoint::TableCell,
                        "date range kept in one cell",
                    );
                }
            }
        }
    }

    // ── (b) multi-column rows ───────────────────────────

    fn table_rows(
        &self,
        contexts: &[TagContext],
        view: &TargetView<'_>,
        positions: &PositionModel,
        state: &mut Assignment,
    ) {
        // (table, row) -> reference cell -> member tags
        let mut rows: BTreeMap<(usize, usize), BTreeMap<TablePosition, Vec<&TagContext>>> = BTreeMap::new();
        for context in contexts.iter().filter(|c| !state.done.contains(&c.tag)) {
            if let Some(position) = context.table_position {
                rows.entry((position.table_index, position.row))
                    .or_default()
                    .entry(position)
                    .or_default()
                    .push(context);
            }
        }

        for cells in rows.values().filter(|cells| cells.len() > 1) {
            let members: Vec<&TagContext> = cells.values().flatten().copied().collect();
            let label: BTreeSet<String> = members
                .iter()
                .flat_map(|c| significant_keywords(&c.label_before))
                .collect();
            if label.is_empty() {
                continue;
            }
            let expected = positions.expected(members[0].paragraph_index);
            let Some(mut free) = self.best_row(&label, view, expected, state) else {
                continue;
            };

            let mut pending: Vec<(&TablePosition, &Vec<&TagContext>)> = Vec::new();

            // Column headers first.
            for (ref_position, tags) in cells {
                let header = significant_keywords(&tags[0].label_after);
                let by_header = free
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| {
                        let position = p.table_position?;
                        let shared = overlap(&header, &significant_keywords(&view.column_header(position)));
                        (shared > 0.0).then_some((i, shared))
                    })
                    .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
                match by_header {
                    Some((i, _)) => {
                        let target = free.remove(i);
                        for tag in tags {
                            state.assign(&tag.tag, target.index, TABLE_ROW_CONFIDENCE, InsertionPoint::TableCell, "row label and column header");
                        }
                    }
                    None => pending.push((ref_position, tags)),
                }
            }

            // Then by column order.
            for ((_, tags), target) in pending.into_iter().zip(free) {
                for tag in tags {
                    state.assign(&tag.tag, target.index, TABLE_ROW_CONFIDENCE, InsertionPoint::TableCell, "row label, column order");
                }
            }
        }
    }

    /// Free blank cells (column > 0) of the target row whose header best matches `label`.
    fn best_row<'v>(
        &self,
        label: &BTreeSet<String>,
        view: &TargetView<'v>,
        expected: usize,
        state: &Assignment,
    ) -> Option<Vec<&'v TargetParagraph>> {
        view.rows()
            .into_values()
            .filter_map(|positions| {
                let header_position = TablePosition { column: 0, ..positions[0] };
                let shared = overlap(label, &significant_keywords(&view.cell_text(header_position)));
                if shared <= 0.0 {
                    return None;
                }
                let free: Vec<&TargetParagraph> = positions
                    .iter()
                    .filter(|p| p.column > 0)
                    .filter_map(|p| view.cell_slot(*p))
                    .filter(|p| p.is_blank() && state.is_free(p))
                    .collect();
                let anchor = view.cell_slot(header_position).map(|p| p.index).unwrap_or(0);
                (!free.is_empty()).then_some((shared, distance(anchor, expected), free))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, _, free)| free)
    }

    // ── (c) percentages ─────────────────────────────────

    fn percentages(
        &self,
        contexts: &[TagContext],
        view: &TargetView<'_>,
        positions: &PositionModel,
        state: &mut Assignment,
    ) {
        for context in contexts.iter().filter(|c| is_percentage(c)) {
            if state.done.contains(&context.tag) {
                continue;
            }
            let label = significant_keywords(&context.label_before);
            let expected = positions.expected(context.paragraph_index);

            let best = view
                .iter()
                .filter(|p| p.text.trim() == "%" && state.is_free(p))
                .map(|p| {
                    let around = match p.table_position {
                        Some(position) => view.row_header(position),
                        None => view.previous(p.index).map(|q| q.text.clone()).unwrap_or_default(),
                    };
                    (p, overlap(&label, &significant_keywords(&around)))
                })
                .max_by(|a, b| {
                    a.1.total_cmp(&b.1)
                        .then_with(|| distance(b.0.index, expected).cmp(&distance(a.0.index, expected)))
                        .then_with(|| b.0.index.cmp(&a.0.index))
                });

            if let Some((paragraph, _)) = best {
                let insertion = if paragraph.is_table_cell {
                    InsertionPoint::TableCell
                } else {
                    InsertionPoint::Inline
                };
                state.assign(&context.tag, paragraph.index, PERCENT_CONFIDENCE, insertion, "percentage cell");
            }
        }
    }

    // ── (d) identification fields ───────────────────────

    fn identification(
        &self,
        contexts: &[TagContext],
        view: &TargetView<'_>,
        positions: &PositionModel,
        state: &mut Assignment,
    ) {
        for context in contexts {
            if state.done.contains(&context.tag) {
                continue;
            }
            let Some(field) = identity_field(context) else {
                continue;
            };
            let label = significant_keywords(&context.label_before);
            let expected = positions.expected(context.paragraph_index);

            let labels = view.iter().filter(|p| !p.is_blank() && state.is_free(p)).filter(|p| {
                let t = tokens(&p.text);
                t.len() <= MAX_IDENTITY_LABEL_TOKENS && field.phrases.iter().any(|ph| contains_phrase(&t, ph))
            });

            let best = labels
                .map(|p| {
                    let mut score = overlap(&label, &significant_keywords(&p.text));
                    if context.section.is_some() && context.section == p.section {
                        score += 0.15;
                    }
                    if distance(p.index, expected) <= self.config.label_proximity_window {
                        score += 0.1;
                    }
                    (p, score)
                })
                .max_by(|a, b| {
                    a.1.total_cmp(&b.1)
                        .then_with(|| distance(b.0.index, expected).cmp(&distance(a.0.index, expected)))
                        .then_with(|| b.0.index.cmp(&a.0.index))
                });

            let Some((label_paragraph, _)) = best else {
                continue;
            };

            match view
                .next(label_paragraph.index)
                .filter(|n| n.is_blank() && state.is_free(n))
            {
                Some(slot) => {
                    let insertion = if slot.is_table_cell {
                        InsertionPoint::TableCell
                    } else {
                        InsertionPoint::ReplaceEmpty
                    };
                    state.assign(&context.tag, slot.index, IDENTITY_CONFIDENCE, insertion, "identification field after its label");
                }
                None => {
                    let insertion = if label_paragraph.ends_with_colon() {
                        InsertionPoint::AfterColon
                    } else {
                        InsertionPoint::Inline
                    };
                    state.assign(&context.tag, label_paragraph.index, IDENTITY_CONFIDENCE, insertion, "identification field on its label");
                }
            }
        }
    }

    // ── (e) keyword scoring ─────────────────────────────

    fn keyword_scores(
        &self,
        contexts: &[TagContext],
        view: &TargetView<'_>,
        positions: &PositionModel,
        state: &mut Assignment,
    ) {
        let scorer = KeywordScorer::new(self.config);
        for context in contexts {
            if state.done.contains(&context.tag) {
                continue;
            }
            match scorer.accepted(context, view, positions, &state.used) {
                Some(candidate) => state.assign(
                    &context.tag,
                    candidate.target_index,
                    candidate.score.min(1.0),
                    candidate.insertion_point,
                    "keyword overlap",
                ),
                None => tracing::debug!(tag = %context.tag, "No pattern candidate above floor"),
            }
        }
    }
}

fn is_percentage(context: &TagContext) -> bool {
    let tag = context.tag.to_uppercase();
    ["PCT", "TAUX", "POURC", "PERCENT"].iter().any(|h| tag.contains(h))
        || context.label_before.contains('%')
        || context.label_after.contains('%')
}

fn identity_field(context: &TagContext) -> Option<&'static IdentityField> {
    let label = tokens(&context.label_before);
    if let Some(field) = IDENTITY_FIELDS
        .iter()
        .find(|f| f.phrases.iter().any(|ph| contains_phrase(&label, ph)))
    {
        return Some(field);
    }
    let parts: Vec<String> = context.tag.to_uppercase().split('_').map(str::to_string).collect();
    IDENTITY_FIELDS
        .iter()
        .find(|f| f.tag_hints.iter().any(|h| parts.iter().any(|p| p == h)))
}

fn sorted(mut matches: Vec<MatchResult>) -> Vec<MatchResult> {
    matches.sort_by(|a, b| a.target_index.cmp(&b.target_index).then_with(|| a.tag.cmp(&b.tag)));
    matches
}
