use std::collections::BTreeSet;
use std::ops::Range;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Paragraphs before the first lettered section.
    Preamble,
    /// A lettered administrative section (`A - Identification`).
    Section,
    /// A body-level table.
    Table,
    /// Text between explicit page breaks, for documents without lettered sections.
    Page,
}

/// A bounded region of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Position in document order.
    pub id: usize,
    pub kind: SegmentKind,
    /// Section letter, `table N`, `page N`, or `preamble`.
    pub label: String,
    /// Byte span of the bounding element(s) in the XML.
    pub span: Range<usize>,
    /// Global indices of the paragraphs attributed to this segment.
    pub paragraph_indices: Vec<usize>,
    pub column_count: Option<usize>,
    /// Reference tags whose source paragraph lies in the segment.
    pub tags: Vec<String>,
    pub char_count: usize,
    #[serde(skip)]
    pub vocabulary: BTreeSet<String>,
}

impl Segment {
    pub fn contains_paragraph(&self, index: usize) -> bool {
        self.paragraph_indices.binary_search(&index).is_ok()
    }
}

/// A reference segment paired with the target segment it corresponds to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPair {
    pub reference: usize,
    pub target: usize,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationStats {
    pub reference_segments: usize,
    pub target_segments: usize,
    pub sections: usize,
    pub tables: usize,
    pub pages: usize,
    pub matched_pairs: usize,
    pub unmatched_tags: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationResult {
    pub reference: Vec<Segment>,
    pub target: Vec<Segment>,
    pub pairs: Vec<SegmentPair>,
    /// Tags no target segment is responsible for; the caller matches them globally.
    pub unmatched_tags: Vec<String>,
    pub stats: SegmentationStats,
}

impl SegmentationResult {
    pub fn reference_segment(&self, id: usize) -> Option<&Segment> {
        self.reference.iter().find(|s| s.id == id)
    }

    pub fn target_segment(&self, id: usize) -> Option<&Segment> {
        self.target.iter().find(|s| s.id == id)
    }
}
