//! Hybrid segmentation: lettered sections (else explicit pages), then
//! body-level tables,
//! each paragraph attributed to the innermost bound containing its offset.

use std::collections::HashSet;

use super::matcher::pair_segments;
use super::types::{Segment, SegmentKind, SegmentationResult, SegmentationStats};
use crate::markup::{strip_placeholders, TagContext, TargetParagraph, TreeScan};
use crate::pipeline::candidates::keywords::significant_keywords;
use crate::pipeline_config::{MappingConfig, SegmentationThresholds};

/// The three inputs of the segmentation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationSignals {
    pub document_chars: usize,
    pub tag_count: usize,
    pub prefix_count: usize,
}

impl SegmentationSignals {
    pub fn measure(target: &[TargetParagraph], contexts: &[TagContext]) -> Self {
        let prefixes: HashSet<&str> = contexts.iter().map(|c| c.prefix()).collect();
        Self {
            document_chars: target.iter().map(|p| p.text.chars().count()).sum(),
            tag_count: contexts.len(),
            prefix_count: prefixes.len(),
        }
    }
}

/// Segment only when at least two of: large document, many tags, tags spread
/// over several prefixes.
pub fn should_segment(signals: SegmentationSignals, thresholds: &SegmentationThresholds) -> bool {
    let votes = [
        signals.document_chars > thresholds.min_chars,
        signals.tag_count > thresholds.min_tags,
        signals.prefix_count >= thresholds.min_prefixes,
    ];
    votes.iter().filter(|v| **v).count() >= 2
}

struct Bound {
    kind: SegmentKind,
    label: String,
    start: usize,
    end: usize,
    column_count: Option<usize>,
}

pub struct Segmenter<'c> {
    config: &'c MappingConfig,
}

impl<'c> Segmenter<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    /// Segment both documents, attribute reference tags and pair the segments.
    pub fn segment(&self, reference: &TreeScan, target: &TreeScan, contexts: &[TagContext]) -> SegmentationResult {
        let _span = tracing::info_span!("segmentation").entered();

        let mut reference_segments = segment_document(reference);
        let target_segments = segment_document(target);

        let mut unattributed = Vec::new();
        for context in contexts {
            match reference_segments
                .iter_mut()
                .find(|s| s.contains_paragraph(context.paragraph_index))
            {
                Some(segment) => segment.tags.push(context.tag.clone()),
                None => unattributed.push(context.tag.clone()),
            }
        }

        let (pairs, mut unmatched_tags) = pair_segments(
            &reference_segments,
            &target_segments,
            self.config.segmentation.similarity_floor,
        );
        unmatched_tags.extend(unattributed);

        let stats = SegmentationStats {
            reference_segments: reference_segments.len(),
            target_segments: target_segments.len(),
            sections: target_segments.iter().filter(|s| s.kind == SegmentKind::Section).count(),
            tables: target_segments.iter().filter(|s| s.kind == SegmentKind::Table).count(),
            pages: target_segments.iter().filter(|s| s.kind == SegmentKind::Page).count(),
            matched_pairs: pairs.len(),
            unmatched_tags: unmatched_tags.len(),
        };
        tracing::info!(
            reference_segments = stats.reference_segments,
            target_segments = stats.target_segments,
            pairs = stats.matched_pairs,
            unmatched_tags = stats.unmatched_tags,
            "Documents segmented"
        );

        SegmentationResult {
            reference: reference_segments,
            target: target_segments,
            pairs,
            unmatched_tags,
            stats,
        }
    }
}

/// Split one scanned document into preamble, section and table segments.
pub fn segment_document(scan: &TreeScan) -> Vec<Segment> {
    let mut bounds: Vec<Bound> = Vec::new();

    let mut current: Option<char> = None;
    for paragraph in scan.paragraphs.iter().filter(|p| p.table_position.is_none()) {
        if paragraph.section.is_some() && paragraph.section != current {
            current = paragraph.section;
            if let Some(previous) = bounds.last_mut() {
                previous.end = paragraph.span.start;
            }
            bounds.push(Bound {
                kind: SegmentKind::Section,
                label: paragraph.section.map(String::from).unwrap_or_default(),
                start: paragraph.span.start,
                end: usize::MAX,
                column_count: None,
            });
        }
    }
    if bounds.is_empty() && !scan.page_breaks.is_empty() {
        let mut start = 0;
        for (n, &end) in scan.page_breaks.iter().chain([usize::MAX].iter()).enumerate() {
            bounds.push(Bound {
                kind: SegmentKind::Page,
                label: format!("page {}", n + 1),
                start,
                end,
                column_count: None,
            });
            start = end;
        }
    } else {
        let first_section = bounds.first().map_or(usize::MAX, |b| b.start);
        bounds.push(Bound {
            kind: SegmentKind::Preamble,
            label: "preamble".into(),
            start: 0,
            end: first_section,
            column_count: None,
        });
    }

    let tables: Vec<Bound> = scan
        .tables
        .iter()
        .filter(|t| t.depth == 0)
        .map(|t| Bound {
            kind: SegmentKind::Table,
            label: format!("table {}", t.index),
            start: t.span.start,
            end: t.span.end,
            column_count: Some(t.column_count),
        })
        .collect();

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); bounds.len() + tables.len()];
    for paragraph in &scan.paragraphs {
        let offset = paragraph.span.start;
        let slot = tables
            .iter()
            .position(|t| (t.start..t.end).contains(&offset))
            .map(|i| bounds.len() + i)
            .or_else(|| bounds.iter().position(|b| (b.start..b.end).contains(&offset)));
        if let Some(slot) = slot {
            members[slot].push(paragraph.index);
        }
    }

    let mut segments: Vec<Segment> = bounds
        .into_iter()
        .chain(tables)
        .zip(members)
        .filter(|(_, indices)| !indices.is_empty())
        .map(|(bound, indices)| {
            let text: Vec<String> = indices
                .iter()
                .filter_map(|i| scan.paragraph(*i))
                .map(|p| strip_placeholders(&p.text))
                .collect();
            let joined = text.join(" ");
            let end = if bound.end == usize::MAX {
                scan.paragraphs.last().map_or(bound.start, |p| p.span.end)
            } else {
                bound.end
            };
            Segment {
                id: 0,
                kind: bound.kind,
                label: bound.label,
                span: bound.start..end,
                paragraph_indices: indices,
                column_count: bound.column_count,
                tags: Vec::new(),
                char_count: joined.chars().count(),
                vocabulary: significant_keywords(&joined),
            }
        })
        .collect();

    segments.sort_by_key(|s| (s.paragraph_indices.first().copied(), s.span.start));
    for (id, segment) in segments.iter_mut().enumerate() {
        segment.id = id;
    }
    segments
}
