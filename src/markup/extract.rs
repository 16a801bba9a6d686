//! Record extraction from a scanned markup tree: reference tag contexts,
//! target paragraphs and checkboxes, all keyed by stable global indices.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::tree::{is_checkbox_glyph, CheckboxEncoding, MarkupTree, ParagraphNode, TreeScan};
use super::types::{CheckboxKind, ExtractedCheckbox, TablePosition, TagContext, TagType, TargetParagraph};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid regex"));

/// Labels longer than this are cut; the keyword scorer never needs more.
const MAX_LABEL_CHARS: usize = 200;

/// Checkbox labels are short by nature ("Oui", "Non", "Groupement conjoint").
const MAX_CHECKBOX_LABEL_CHARS: usize = 80;

/// A `{{TAG}}` occurrence located in the XML.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderHit {
    pub tag: String,
    pub paragraph_index: usize,
    /// Byte offset of the owning paragraph in the XML.
    pub xml_offset: usize,
}

pub fn placeholder_names(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER.replace_all(text, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every placeholder occurrence, in document order.
pub fn find_placeholders(scan: &TreeScan) -> Vec<PlaceholderHit> {
    scan.paragraphs
        .iter()
        .flat_map(|p| {
            placeholder_names(&p.text).into_iter().map(move |tag| PlaceholderHit {
                tag,
                paragraph_index: p.index,
                xml_offset: p.span.start,
            })
        })
        .collect()
}

/// Build one `TagContext` per distinct placeholder of a reference document.
///
/// When a tag appears several times, the first occurrence wins.
pub fn extract_tag_contexts(tree: &MarkupTree) -> Vec<TagContext> {
    let scan = tree.scan();
    let checkbox_paragraphs: HashSet<usize> =
        scan.checkboxes.iter().map(|c| c.paragraph_index).collect();

    let mut seen = HashSet::new();
    let mut contexts = Vec::new();

    for paragraph in &scan.paragraphs {
        for caps in PLACEHOLDER.captures_iter(&paragraph.text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let tag = caps[1].to_string();
            if !seen.insert(tag.clone()) {
                tracing::debug!(tag = %tag, paragraph = paragraph.index, "Duplicate placeholder ignored");
                continue;
            }

            let inline_before = strip_placeholders(&paragraph.text[..whole.start()]);
            let inline_after = strip_placeholders(&paragraph.text[whole.end()..]);

            let label_before = if inline_before.is_empty() {
                fallback_label_before(&scan, paragraph)
            } else {
                inline_before
            };
            let label_after = if inline_after.is_empty() {
                fallback_label_after(&scan, paragraph)
            } else {
                inline_after
            };

            let tag_type = classify_tag(&tag, paragraph, checkbox_paragraphs.contains(&paragraph.index));

            contexts.push(TagContext {
                tag,
                label_before: truncate_chars(&label_before, MAX_LABEL_CHARS),
                label_after: truncate_chars(&label_after, MAX_LABEL_CHARS),
                section: paragraph.section,
                tag_type,
                table_position: paragraph.table_position,
                paragraph_index: paragraph.index,
            });
        }
    }

    contexts
}

fn classify_tag(tag: &str, paragraph: &ParagraphNode, has_checkbox: bool) -> TagType {
    if tag.to_uppercase().contains("DATE") {
        TagType::Date
    } else if has_checkbox {
        TagType::Checkbox
    } else if paragraph.table_position.is_some() {
        TagType::TableCell
    } else {
        TagType::Text
    }
}

/// Row header for table cells, otherwise the nearest preceding non-empty paragraph.
fn fallback_label_before(scan: &TreeScan, paragraph: &ParagraphNode) -> String {
    if let Some(pos) = paragraph.table_position {
        if pos.column > 0 {
            let header = strip_placeholders(&scan.cell_text(TablePosition { column: 0, ..pos }));
            if !header.is_empty() {
                return header;
            }
        }
    }
    scan.paragraphs[..paragraph.index.min(scan.paragraphs.len())]
        .iter()
        .rev()
        .map(|p| strip_placeholders(&p.text))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Column header for table cells, otherwise the next non-empty paragraph.
fn fallback_label_after(scan: &TreeScan, paragraph: &ParagraphNode) -> String {
    if let Some(pos) = paragraph.table_position {
        if pos.row > 0 {
            let header = strip_placeholders(&scan.cell_text(TablePosition { row: 0, ..pos }));
            if !header.is_empty() {
                return header;
            }
        }
    }
    scan.paragraphs
        .iter()
        .skip(paragraph.index + 1)
        .map(|p| strip_placeholders(&p.text))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

pub fn extract_target_paragraphs(tree: &MarkupTree) -> Vec<TargetParagraph> {
    paragraphs_from_scan(&tree.scan())
}

pub fn paragraphs_from_scan(scan: &TreeScan) -> Vec<TargetParagraph> {
    scan.paragraphs
        .iter()
        .map(|p| TargetParagraph {
            index: p.index,
            text: p.text.trim().to_string(),
            section: p.section,
            is_table_cell: p.table_position.is_some(),
            has_existing_tag: contains_placeholder(&p.text),
            table_position: p.table_position,
        })
        .collect()
}

pub fn extract_checkboxes(tree: &MarkupTree) -> Vec<ExtractedCheckbox> {
    checkboxes_from_scan(&tree.scan())
}

pub fn checkboxes_from_scan(scan: &TreeScan) -> Vec<ExtractedCheckbox> {
    scan.checkboxes
        .iter()
        .enumerate()
        .map(|(position, checkbox)| {
            let paragraph = scan.paragraph(checkbox.paragraph_index);
            let label = paragraph
                .map(|p| {
                    let next_mark = scan.checkboxes[position + 1..]
                        .iter()
                        .find(|c| c.paragraph_index == p.index)
                        .map(|c| c.text_offset);
                    let previous_mark = scan.checkboxes[..position]
                        .iter()
                        .rev()
                        .find(|c| c.paragraph_index == p.index)
                        .map(|c| c.text_offset);
                    checkbox_label(&p.text, checkbox.text_offset, previous_mark, next_mark)
                })
                .unwrap_or_default();

            ExtractedCheckbox {
                index: checkbox.ordinal,
                paragraph_index: checkbox.paragraph_index,
                checked: checkbox.checked,
                kind: match checkbox.encoding {
                    CheckboxEncoding::Glyph => CheckboxKind::Unicode,
                    CheckboxEncoding::LegacyField | CheckboxEncoding::ContentControl => {
                        CheckboxKind::FormControl
                    }
                },
                label,
                section: paragraph.and_then(|p| p.section),
            }
        })
        .collect()
}

/// Text after the mark up to the next mark; falls back to the text before it.
fn checkbox_label(text: &str, offset: usize, previous: Option<usize>, next: Option<usize>) -> String {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    let end = next.map_or(text.len(), |n| floor_char_boundary(text, n.min(text.len())).max(offset));
    let after = clean_label(&text[offset..end]);
    if !after.is_empty() {
        return truncate_chars(&after, MAX_CHECKBOX_LABEL_CHARS);
    }

    let start = previous.map_or(0, |p| floor_char_boundary(text, p.min(offset)));
    let before = clean_label(&text[start..offset]);
    truncate_chars(&before, MAX_CHECKBOX_LABEL_CHARS)
}

fn clean_label(raw: &str) -> String {
    let without_marks: String = raw.chars().filter(|c| !is_checkbox_glyph(*c)).collect();
    strip_placeholders(&without_marks)
        .trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-')
        .to_string()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
