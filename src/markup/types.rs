use serde::{Deserialize, Serialize};

/// Container format detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Docx,
    Pdf,
    Unknown,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }
}

/// Kind of slot a placeholder occupied in the reference document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Text,
    Checkbox,
    TableCell,
    Date,
}

impl TagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Checkbox => "checkbox",
            Self::TableCell => "table_cell",
            Self::Date => "date",
        }
    }
}

/// Coordinates of a table cell. `table_index` counts `w:tbl` elements in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TablePosition {
    pub table_index: usize,
    pub row: usize,
    pub column: usize,
}

/// Where a placeholder sat in the reference document, semantically and structurally.
///
/// Built once per reference document and never mutated during a mapping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagContext {
    pub tag: String,
    pub label_before: String,
    pub label_after: String,
    pub section: Option<char>,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub table_position: Option<TablePosition>,
    /// Global index of the reference paragraph holding the placeholder.
    pub paragraph_index: usize,
}

impl TagContext {
    /// Tag prefix up to the first underscore (`SOC_NOM` -> `SOC`).
    pub fn prefix(&self) -> &str {
        self.tag.split('_').next().unwrap_or(&self.tag)
    }

    /// Combined label text used for keyword comparisons.
    pub fn label_text(&self) -> String {
        if self.label_after.is_empty() {
            self.label_before.clone()
        } else if self.label_before.is_empty() {
            self.label_after.clone()
        } else {
            format!("{} {}", self.label_before, self.label_after)
        }
    }
}

/// One paragraph (or table-cell paragraph) of the target document.
///
/// `index` is document-global and stays valid when paragraphs are filtered
/// into per-segment subsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetParagraph {
    pub index: usize,
    pub text: String,
    pub section: Option<char>,
    pub is_table_cell: bool,
    pub has_existing_tag: bool,
    pub table_position: Option<TablePosition>,
}

impl TargetParagraph {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn ends_with_colon(&self) -> bool {
        self.text.trim_end().ends_with(':')
    }
}

/// Encoding of a checkbox in the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxKind {
    /// Glyph in a text run (☐ / ☑ / ☒).
    Unicode,
    /// Legacy form field or content control with a stored checked flag.
    FormControl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCheckbox {
    /// Ordinal of the checkbox in document order.
    pub index: usize,
    pub paragraph_index: usize,
    pub checked: bool,
    pub kind: CheckboxKind,
    pub label: String,
    pub section: Option<char>,
}
