//! Structural scan of a WordprocessingML main part.
//!
//! The tree keeps the raw XML string and derives paragraphs, tables,
//! checkboxes and page breaks from it by byte offset. Nothing here mutates
//! the XML; edits are planned elsewhere and applied right-to-left in one pass.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::types::TablePosition;
use super::xml::unescape;

/// Opening/closing tags of the four structural elements we track.
/// `w:pPr`, `w:tblPr`, `w:tcPr` etc. do not match because the name must be
/// followed by whitespace, `/` or `>`.
static STRUCTURE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)w:(tbl|tr|tc|p)((?:\s[^>]*?)?)(/?)>").expect("valid regex")
});

static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("valid regex"));

static RUN_PROPERTIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:rPr>.*?</w:rPr>").expect("valid regex"));

static PAGE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<w:br\s[^>]*w:type="page"[^>]*/>"#).expect("valid regex"));

static LEGACY_CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:checkBox>.*?</w:checkBox>").expect("valid regex"));

static LEGACY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<w:(default|checked)(?:\s+w:val="([^"]*)")?\s*/>"#).expect("valid regex")
});

static CONTENT_CONTROL_CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w14:checkbox>.*?</w14:checkbox>").expect("valid regex"));

static CONTENT_CONTROL_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<w14:checked\s+w14:val="([^"]*)"\s*/>"#).expect("valid regex"));

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Z])\s*[-–—.):]\s+\S").expect("valid regex"));

pub const UNCHECKED_GLYPH: char = '☐';
pub const CHECKED_GLYPHS: [char; 2] = ['☒', '☑'];

pub fn is_checkbox_glyph(ch: char) -> bool {
    ch == UNCHECKED_GLYPH || CHECKED_GLYPHS.contains(&ch)
}

/// A `w:t` element inside a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Byte range of the element's character data in the XML.
    pub content_span: Range<usize>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphNode {
    pub index: usize,
    /// Full `<w:p ...>...</w:p>` (or self-closing `<w:p/>`) span.
    pub span: Range<usize>,
    /// Offset of the closing `</w:p>` tag; `None` for self-closing paragraphs.
    pub close_offset: Option<usize>,
    pub runs: Vec<TextRun>,
    pub text: String,
    /// Last `<w:rPr>` block seen inside the paragraph, reused for new runs.
    pub run_properties: Option<String>,
    pub table_position: Option<TablePosition>,
    pub section: Option<char>,
}

impl ParagraphNode {
    pub fn is_self_closing(&self) -> bool {
        self.close_offset.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableNode {
    pub index: usize,
    pub span: Range<usize>,
    pub row_count: usize,
    pub column_count: usize,
    /// Nesting depth; 0 for body-level tables.
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckboxEncoding {
    Glyph,
    LegacyField,
    ContentControl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckboxNode {
    pub ordinal: usize,
    pub paragraph_index: usize,
    pub encoding: CheckboxEncoding,
    pub checked: bool,
    /// Span holding the state: the glyph, the `w:checkBox` element, or the `w14:checked` element.
    pub state_span: Range<usize>,
    /// Display glyph of a content control, toggled together with its state.
    pub glyph_span: Option<Range<usize>>,
    /// Byte offset of the mark inside the paragraph's visible text.
    pub text_offset: usize,
}

/// Result of one structural scan.
#[derive(Debug, Clone, Default)]
pub struct TreeScan {
    pub paragraphs: Vec<ParagraphNode>,
    pub tables: Vec<TableNode>,
    pub checkboxes: Vec<CheckboxNode>,
    pub page_breaks: Vec<usize>,
}

impl TreeScan {
    pub fn paragraph(&self, index: usize) -> Option<&ParagraphNode> {
        self.paragraphs.get(index).filter(|p| p.index == index)
    }

    /// Innermost paragraph containing the byte offset.
    pub fn paragraph_at(&self, offset: usize) -> Option<&ParagraphNode> {
        self.paragraphs
            .iter()
            .filter(|p| p.span.contains(&offset))
            .min_by_key(|p| p.span.len())
    }

    /// Joined text of every paragraph in a table cell.
    pub fn cell_text(&self, position: TablePosition) -> String {
        self.paragraphs
            .iter()
            .filter(|p| p.table_position == Some(position))
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Owned WordprocessingML main part.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupTree {
    xml: String,
}

struct OpenTable {
    index: usize,
    start: usize,
    row: Option<usize>,
    column: Option<usize>,
    row_count: usize,
    column_count: usize,
}

struct RawCheckbox {
    encoding: CheckboxEncoding,
    checked: bool,
    state_span: Range<usize>,
    glyph_span: Option<Range<usize>>,
}

struct OpenParagraph {
    index: usize,
    start: usize,
    table_position: Option<TablePosition>,
    children: Vec<Range<usize>>,
}

impl MarkupTree {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn len(&self) -> usize {
        self.xml.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xml.is_empty()
    }

    pub fn into_xml(self) -> String {
        self.xml
    }

    /// Scan paragraphs, tables, checkboxes and explicit page breaks.
    pub fn scan(&self) -> TreeScan {
        let (mut paragraphs, tables) = self.scan_structure();
        assign_sections(&mut paragraphs);
        let checkboxes = self.scan_checkboxes(&paragraphs);
        let page_breaks = PAGE_BREAK.find_iter(&self.xml).map(|m| m.start()).collect();

        TreeScan {
            paragraphs,
            tables,
            checkboxes,
            page_breaks,
        }
    }

    fn scan_structure(&self) -> (Vec<ParagraphNode>, Vec<TableNode>) {
        let mut tables_open: Vec<OpenTable> = Vec::new();
        let mut paragraphs_open: Vec<OpenParagraph> = Vec::new();
        let mut paragraphs = Vec::new();
        let mut tables = Vec::new();
        let mut next_paragraph = 0;
        let mut next_table = 0;

        for caps in STRUCTURE_TAG.captures_iter(&self.xml) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let closing = !caps[1].is_empty();
            let self_closing = !caps[4].is_empty();
            let name = &caps[2];

            match (name, closing) {
                ("tbl", false) if !self_closing => {
                    tables_open.push(OpenTable {
                        index: next_table,
                        start: whole.start(),
                        row: None,
                        column: None,
                        row_count: 0,
                        column_count: 0,
                    });
                    next_table += 1;
                }
                ("tbl", true) => {
                    if let Some(open) = tables_open.pop() {
                        tables.push(TableNode {
                            index: open.index,
                            span: open.start..whole.end(),
                            row_count: open.row_count,
                            column_count: open.column_count,
                            depth: tables_open.len(),
                        });
                    }
                }
                ("tr", false) if !self_closing => {
                    if let Some(table) = tables_open.last_mut() {
                        let row = table.row.map_or(0, |r| r + 1);
                        table.row = Some(row);
                        table.column = None;
                        table.row_count = row + 1;
                    }
                }
                ("tc", false) if !self_closing => {
                    if let Some(table) = tables_open.last_mut() {
                        let column = table.column.map_or(0, |c| c + 1);
                        table.column = Some(column);
                        table.column_count = table.column_count.max(column + 1);
                    }
                }
                ("p", false) => {
                    let table_position = tables_open.last().and_then(|t| {
                        Some(TablePosition {
                            table_index: t.index,
                            row: t.row?,
                            column: t.column?,
                        })
                    });
                    let index = next_paragraph;
                    next_paragraph += 1;

                    if self_closing {
                        paragraphs.push(ParagraphNode {
                            index,
                            span: whole.start()..whole.end(),
                            close_offset: None,
                            runs: Vec::new(),
                            text: String::new(),
                            run_properties: None,
                            table_position,
                            section: None,
                        });
                        if let Some(parent) = paragraphs_open.last_mut() {
                            parent.children.push(whole.start()..whole.end());
                        }
                    } else {
                        paragraphs_open.push(OpenParagraph {
                            index,
                            start: whole.start(),
                            table_position,
                            children: Vec::new(),
                        });
                    }
                }
                ("p", true) => {
                    if let Some(open) = paragraphs_open.pop() {
                        let span = open.start..whole.end();
                        let node = self.build_paragraph(open, span.clone(), whole.start());
                        if let Some(parent) = paragraphs_open.last_mut() {
                            parent.children.push(span);
                        }
                        paragraphs.push(node);
                    }
                }
                _ => {}
            }
        }

        paragraphs.sort_by_key(|p| p.index);
        tables.sort_by_key(|t| t.index);
        (paragraphs, tables)
    }

    fn build_paragraph(
        &self,
        open: OpenParagraph,
        span: Range<usize>,
        close_offset: usize,
    ) -> ParagraphNode {
        let inside_child = |offset: usize| open.children.iter().any(|c| c.contains(&offset));
        let body = &self.xml[span.clone()];

        let runs: Vec<TextRun> = TEXT_RUN
            .captures_iter(body)
            .filter_map(|caps| {
                let content = caps.get(1)?;
                let start = span.start + content.start();
                if inside_child(start) {
                    return None;
                }
                Some(TextRun {
                    content_span: start..span.start + content.end(),
                    text: unescape(content.as_str()),
                })
            })
            .collect();

        let run_properties = RUN_PROPERTIES
            .find_iter(body)
            .filter(|m| !inside_child(span.start + m.start()))
            .last()
            .map(|m| m.as_str().to_string());

        let text = runs.iter().map(|r| r.text.as_str()).collect();

        ParagraphNode {
            index: open.index,
            span,
            close_offset: Some(close_offset),
            runs,
            text,
            run_properties,
            table_position: open.table_position,
            section: None,
        }
    }

    fn scan_checkboxes(&self, paragraphs: &[ParagraphNode]) -> Vec<CheckboxNode> {
        let mut found: Vec<RawCheckbox> = Vec::new();
        let mut control_spans: Vec<Range<usize>> = Vec::new();

        // Content controls first: their display glyph must not count twice.
        for m in CONTENT_CONTROL_CHECKBOX.find_iter(&self.xml) {
            let Some(state) = CONTENT_CONTROL_STATE.captures(m.as_str()) else {
                continue;
            };
            let Some(state_match) = state.get(0) else {
                continue;
            };
            let sdt_span = self.enclosing_sdt(m.start(), m.end());
            let glyph_span = sdt_span.as_ref().and_then(|sdt| self.first_glyph_in(sdt.clone()));
            if let Some(sdt) = sdt_span {
                control_spans.push(sdt);
            }

            found.push(RawCheckbox {
                encoding: CheckboxEncoding::ContentControl,
                checked: is_truthy(&state[1]),
                state_span: m.start() + state_match.start()..m.start() + state_match.end(),
                glyph_span,
            });
        }

        for m in LEGACY_CHECKBOX.find_iter(&self.xml) {
            found.push(RawCheckbox {
                encoding: CheckboxEncoding::LegacyField,
                checked: legacy_checkbox_state(m.as_str()),
                state_span: m.start()..m.end(),
                glyph_span: None,
            });
        }

        for paragraph in paragraphs {
            for run in &paragraph.runs {
                // Glyphs are written literally in w:t; scan the raw bytes.
                let raw = &self.xml[run.content_span.clone()];
                for (offset, ch) in raw.char_indices() {
                    if !is_checkbox_glyph(ch) {
                        continue;
                    }
                    let start = run.content_span.start + offset;
                    if control_spans.iter().any(|s| s.contains(&start)) {
                        continue;
                    }
                    found.push(RawCheckbox {
                        encoding: CheckboxEncoding::Glyph,
                        checked: CHECKED_GLYPHS.contains(&ch),
                        state_span: start..start + ch.len_utf8(),
                        glyph_span: None,
                    });
                }
            }
        }

        found.sort_by_key(|raw| raw.state_span.start);

        let mut nodes = Vec::with_capacity(found.len());
        for raw in found {
            let offset = raw.state_span.start;
            let Some(paragraph) = paragraphs
                .iter()
                .filter(|p| p.span.contains(&offset))
                .min_by_key(|p| p.span.len())
            else {
                continue;
            };
            nodes.push(CheckboxNode {
                ordinal: nodes.len(),
                paragraph_index: paragraph.index,
                encoding: raw.encoding,
                checked: raw.checked,
                text_offset: text_offset_in(&self.xml, paragraph, offset),
                state_span: raw.state_span,
                glyph_span: raw.glyph_span,
            });
        }
        nodes
    }

    /// Span of the `w:sdt` element wrapping a content-control checkbox.
    fn enclosing_sdt(&self, inner_start: usize, inner_end: usize) -> Option<Range<usize>> {
        let before = &self.xml[..inner_start];
        let start = before
            .rfind("<w:sdt>")
            .into_iter()
            .chain(before.rfind("<w:sdt "))
            .max()?;
        let end = self.xml[inner_end..].find("</w:sdt>")? + inner_end + "</w:sdt>".len();
        Some(start..end)
    }

    fn first_glyph_in(&self, span: Range<usize>) -> Option<Range<usize>> {
        let region = &self.xml[span.clone()];
        for caps in TEXT_RUN.captures_iter(region) {
            let content = caps.get(1)?;
            for (offset, ch) in content.as_str().char_indices() {
                if is_checkbox_glyph(ch) {
                    let start = span.start + content.start() + offset;
                    return Some(start..start + ch.len_utf8());
                }
            }
        }
        None
    }
}

/// Map an XML offset to a byte offset in the paragraph's visible text.
fn text_offset_in(xml: &str, paragraph: &ParagraphNode, xml_offset: usize) -> usize {
    let mut offset = 0;
    for run in &paragraph.runs {
        if run.content_span.end <= xml_offset {
            offset += run.text.len();
        } else if run.content_span.start <= xml_offset {
            let raw_prefix = xml.get(run.content_span.start..xml_offset).unwrap_or_default();
            offset += unescape(raw_prefix).len().min(run.text.len());
            break;
        } else {
            break;
        }
    }
    offset
}

fn legacy_checkbox_state(element: &str) -> bool {
    let mut default = false;
    let mut explicit: Option<bool> = None;
    for caps in LEGACY_STATE.captures_iter(element) {
        // A bare `<w:checked/>` means true.
        let value = caps.get(2).map_or(true, |v| is_truthy(v.as_str()));
        match &caps[1] {
            "checked" => explicit = Some(value),
            _ => default = value,
        }
    }
    explicit.unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "on")
}

/// Section letter of a paragraph opening a lettered administrative section.
pub fn section_letter(text: &str) -> Option<char> {
    SECTION_HEADER
        .captures(text)
        .and_then(|caps| caps[1].chars().next())
}

fn assign_sections(paragraphs: &mut [ParagraphNode]) {
    let mut current: Option<char> = None;
    for paragraph in paragraphs.iter_mut() {
        if paragraph.table_position.is_none() {
            if let Some(letter) = section_letter(&paragraph.text) {
                current = Some(letter);
            }
        }
        paragraph.section = current;
    }
}
