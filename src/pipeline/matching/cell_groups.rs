//! Reference tags sharing one table cell (e.g. a date range's start and end)
//! must land on one target paragraph.

use std::collections::BTreeMap;

use crate::markup::{TablePosition, TagContext};
use super::types::MatchResult;

#[derive(Debug, Clone, PartialEq)]
pub struct CellGroup {
    pub position: TablePosition,
    /// Member tags in reference order.
    pub tags: Vec<String>,
}

impl CellGroup {
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Every reference cell holding two tags or more, in document order.
pub fn cell_groups(contexts: &[TagContext]) -> Vec<CellGroup> {
    let mut by_cell: BTreeMap<TablePosition, Vec<&TagContext>> = BTreeMap::new();
    for context in contexts {
        if let Some(position) = context.table_position {
            by_cell.entry(position).or_default().push(context);
        }
    }

    let mut groups: Vec<(usize, CellGroup)> = by_cell
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(position, members)| {
            let first = members.iter().map(|c| c.paragraph_index).min().unwrap_or(0);
            (
                first,
                CellGroup {
                    position,
                    tags: members.iter().map(|c| c.tag.clone()).collect(),
                },
            )
        })
        .collect();
    groups.sort_by_key(|(first, group)| (*first, group.position));
    groups.into_iter().map(|(_, group)| group).collect()
}

/// True when both tags sit in the same reference cell.
pub fn share_cell(contexts: &[TagContext], a: &str, b: &str) -> bool {
    let position = |tag: &str| {
        contexts
            .iter()
            .find(|c| c.tag == tag)
            .and_then(|c| c.table_position)
    };
    matches!((position(a), position(b)), (Some(pa), Some(pb)) if pa == pb)
}

/// Force every cell group onto the paragraph of its most confident matched
/// member. Unmatched members join that paragraph too.
pub fn reconcile(contexts: &[TagContext], mut matches: Vec<MatchResult>) -> Vec<MatchResult> {
    for group in cell_groups(contexts) {
        let anchor = matches
            .iter()
            .filter(|m| group.contains(&m.tag))
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| b.target_index.cmp(&a.target_index))
            })
            .cloned();
        let Some(anchor) = anchor else {
            continue;
        };

        for m in matches.iter_mut().filter(|m| group.contains(&m.tag)) {
            if m.target_index != anchor.target_index {
                tracing::debug!(
                    tag = %m.tag,
                    from = m.target_index,
                    to = anchor.target_index,
                    "Cell group member moved onto anchor paragraph"
                );
                m.target_index = anchor.target_index;
                m.insertion_point = anchor.insertion_point;
            }
        }

        for tag in &group.tags {
            if !matches.iter().any(|m| &m.tag == tag) {
                matches.push(MatchResult {
                    tag: tag.clone(),
                    reason: Some(format!("shares a reference cell with {}", anchor.tag)),
                    ..anchor.clone()
                });
            }
        }
    }
    matches
}
