//! Indexed, read-only view over a (possibly filtered) target paragraph list.

use std::collections::{BTreeMap, HashMap};

use crate::markup::{TablePosition, TargetParagraph};

/// Paragraphs sorted by global index, with table-cell lookups.
pub struct TargetView<'a> {
    paragraphs: Vec<&'a TargetParagraph>,
    by_index: HashMap<usize, usize>,
    cells: BTreeMap<TablePosition, Vec<usize>>,
}

impl<'a> TargetView<'a> {
    pub fn new(paragraphs: &'a [TargetParagraph]) -> Self {
        let mut sorted: Vec<&TargetParagraph> = paragraphs.iter().collect();
        sorted.sort_by_key(|p| p.index);
        sorted.dedup_by_key(|p| p.index);

        let mut by_index = HashMap::with_capacity(sorted.len());
        let mut cells: BTreeMap<TablePosition, Vec<usize>> = BTreeMap::new();
        for (pos, p) in sorted.iter().enumerate() {
            by_index.insert(p.index, pos);
            if let Some(tp) = p.table_position {
                cells.entry(tp).or_default().push(pos);
            }
        }

        Self {
            paragraphs: sorted,
            by_index,
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a TargetParagraph> + '_ {
        self.paragraphs.iter().copied()
    }

    pub fn get(&self, index: usize) -> Option<&'a TargetParagraph> {
        self.by_index.get(&index).map(|&pos| self.paragraphs[pos])
    }

    pub fn contains(&self, index: usize) -> bool {
        self.by_index.contains_key(&index)
    }

    /// Smallest and largest global index in the view.
    pub fn index_range(&self) -> Option<(usize, usize)> {
        Some((self.paragraphs.first()?.index, self.paragraphs.last()?.index))
    }

    /// Document paragraph right before `index`, if the view still holds it.
    pub fn previous(&self, index: usize) -> Option<&'a TargetParagraph> {
        self.get(index.checked_sub(1)?)
    }

    /// Document paragraph right after `index`, if the view still holds it.
    pub fn next(&self, index: usize) -> Option<&'a TargetParagraph> {
        self.get(index.checked_add(1)?)
    }

    /// Joined non-blank text of one table cell.
    pub fn cell_text(&self, position: TablePosition) -> String {
        self.cells
            .get(&position)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| self.paragraphs[pos].text.as_str())
                    .filter(|t| !t.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    pub fn row_header(&self, position: TablePosition) -> String {
        if position.column == 0 {
            return String::new();
        }
        self.cell_text(TablePosition { column: 0, ..position })
    }

    pub fn column_header(&self, position: TablePosition) -> String {
        if position.row == 0 {
            return String::new();
        }
        self.cell_text(TablePosition { row: 0, ..position })
    }

    /// Paragraph that receives content for a cell: first blank one, else the first.
    pub fn cell_slot(&self, position: TablePosition) -> Option<&'a TargetParagraph> {
        let positions = self.cells.get(&position)?;
        positions
            .iter()
            .map(|&pos| self.paragraphs[pos])
            .find(|p| p.is_blank())
            .or_else(|| positions.first().map(|&pos| self.paragraphs[pos]))
    }

    /// Every cell position of every row, grouped by `(table_index, row)`.
    pub fn rows(&self) -> BTreeMap<(usize, usize), Vec<TablePosition>> {
        let mut rows: BTreeMap<(usize, usize), Vec<TablePosition>> = BTreeMap::new();
        for position in self.cells.keys() {
            rows.entry((position.table_index, position.row))
                .or_default()
                .push(*position);
        }
        rows
    }

    /// Text that describes what belongs in `paragraph`: row and column headers
    /// for a cell, the preceding label for a blank paragraph, else its own text.
    pub fn slot_label(&self, paragraph: &TargetParagraph) -> String {
        if let Some(position) = paragraph.table_position {
            if paragraph.is_blank() {
                let row = self.row_header(position);
                let column = self.column_header(position);
                return format!("{row} {column}").trim().to_string();
            }
            return paragraph.text.clone();
        }
        if paragraph.is_blank() {
            return self
                .previous(paragraph.index)
                .filter(|p| !p.is_blank() && p.table_position.is_none())
                .map(|p| p.text.clone())
                .unwrap_or_default();
        }
        paragraph.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::{cell, paragraph};

    #[test]
    fn lookups_use_global_indices() {
        let paragraphs = vec![paragraph(12, "b"), paragraph(10, "a"), paragraph(11, "x"), paragraph(15, "")];
        let view = TargetView::new(&paragraphs);
        assert_eq!(view.index_range(), Some((10, 15)));
        assert_eq!(view.previous(12).unwrap().index, 11);
        assert_eq!(view.next(10).unwrap().index, 11);
        assert!(view.previous(10).is_none());
        assert!(view.get(13).is_none());
    }

    #[test]
    fn neighbours_do_not_skip_filtered_paragraphs() {
        // 13 and 14 were claimed and filtered out.
        let paragraphs = vec![paragraph(12, "Adresse :"), paragraph(15, "")];
        let view = TargetView::new(&paragraphs);
        assert!(view.next(12).is_none());
        assert!(view.previous(15).is_none());
        assert_eq!(view.slot_label(&paragraphs[1]), "");
    }

    #[test]
    fn blank_paragraph_takes_previous_label() {
        let paragraphs = vec![paragraph(5, "Numéro SIRET :"), paragraph(6, "")];
        let view = TargetView::new(&paragraphs);
        assert_eq!(view.slot_label(&paragraphs[1]), "Numéro SIRET :");
    }

    #[test]
    fn blank_cell_is_described_by_headers() {
        let paragraphs = vec![
            cell(0, 0, 0, 0, ""),
            cell(1, 0, 0, 1, "Montant"),
            cell(2, 0, 1, 0, "Exercice 2023"),
            cell(3, 0, 1, 1, ""),
        ];
        let view = TargetView::new(&paragraphs);
        assert_eq!(view.slot_label(&paragraphs[3]), "Exercice 2023 Montant");
        assert_eq!(view.cell_slot(TablePosition { table_index: 0, row: 1, column: 1 }).unwrap().index, 3);
        assert_eq!(view.rows().len(), 2);
    }
}
