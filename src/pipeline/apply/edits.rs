//! Span edits over the XML string, collected first and applied right to left
//! in one pass so no edit shifts the offsets of another.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte span to replace; empty for a pure insertion.
    pub span: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            span: at..at,
            replacement: text.into(),
        }
    }

    pub fn replace(span: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            span,
            replacement: text.into(),
        }
    }

    fn overlaps(&self, other: &Edit) -> bool {
        if self.span.is_empty() || other.span.is_empty() {
            // Insertions only clash with an edit strictly around them.
            let (point, range) = if self.span.is_empty() {
                (self.span.start, &other.span)
            } else {
                (other.span.start, &self.span)
            };
            return range.start < point && point < range.end
                || (self.span.is_empty() && other.span.is_empty() && self.span.start == other.span.start);
        }
        self.span.start < other.span.end && other.span.start < self.span.end
    }
}

/// Edits planned against one XML snapshot.
#[derive(Debug, Clone, Default)]
pub struct EditPlan {
    edits: Vec<Edit>,
}

impl EditPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `edit` unless it overlaps one already planned; returns whether it was kept.
    pub fn push(&mut self, edit: Edit) -> bool {
        if self.edits.iter().any(|e| e.overlaps(&edit)) {
            return false;
        }
        self.edits.push(edit);
        true
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply every edit to `xml`, highest offset first.
    pub fn apply(mut self, xml: &str) -> String {
        self.edits
            .sort_by(|a, b| b.span.start.cmp(&a.span.start).then_with(|| b.span.end.cmp(&a.span.end)));
        let mut out = xml.to_string();
        for edit in self.edits {
            if edit.span.end <= out.len() {
                out.replace_range(edit.span, &edit.replacement);
            }
        }
        out
    }
}
