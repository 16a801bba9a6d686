//! Record builders shared by pipeline unit tests.

use crate::markup::{CheckboxKind, ExtractedCheckbox, TablePosition, TagContext, TagType, TargetParagraph};
use crate::pipeline::matching::{InsertionPoint, MatchResult, MatchSource};

pub fn paragraph(index: usize, text: &str) -> TargetParagraph {
    TargetParagraph {
        index,
        text: text.into(),
        section: None,
        is_table_cell: false,
        has_existing_tag: false,
        table_position: None,
    }
}

pub fn cell(index: usize, table_index: usize, row: usize, column: usize, text: &str) -> TargetParagraph {
    TargetParagraph {
        index,
        text: text.into(),
        section: None,
        is_table_cell: true,
        has_existing_tag: false,
        table_position: Some(TablePosition { table_index, row, column }),
    }
}

/// Plain text paragraphs numbered from 0.
pub fn paragraphs(texts: &[&str]) -> Vec<TargetParagraph> {
    texts.iter().enumerate().map(|(i, t)| paragraph(i, t)).collect()
}

pub fn context(tag: &str, label_before: &str) -> TagContext {
    TagContext {
        tag: tag.into(),
        label_before: label_before.into(),
        label_after: String::new(),
        section: None,
        tag_type: TagType::Text,
        table_position: None,
        paragraph_index: 0,
    }
}

pub fn cell_context(
    tag: &str,
    row_header: &str,
    column_header: &str,
    position: (usize, usize, usize),
    tag_type: TagType,
) -> TagContext {
    TagContext {
        tag: tag.into(),
        label_before: row_header.into(),
        label_after: column_header.into(),
        section: None,
        tag_type,
        table_position: Some(TablePosition {
            table_index: position.0,
            row: position.1,
            column: position.2,
        }),
        paragraph_index: 0,
    }
}

pub fn checkbox(index: usize, paragraph_index: usize, label: &str, checked: bool) -> ExtractedCheckbox {
    ExtractedCheckbox {
        index,
        paragraph_index,
        checked,
        kind: CheckboxKind::Unicode,
        label: label.into(),
        section: None,
    }
}

pub fn matched(tag: &str, target_index: usize, insertion_point: InsertionPoint) -> MatchResult {
    MatchResult {
        tag: tag.into(),
        target_index,
        confidence: 0.9,
        insertion_point,
        reason: None,
        source: MatchSource::Oracle,
    }
}
