use serde::{Deserialize, Serialize};

use crate::markup::ExtractedCheckbox;

/// Checked state to write on one target checkbox (by ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckboxDecision {
    pub index: usize,
    pub checked: bool,
}

/// Two checkboxes labelled yes/no close to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxPair {
    pub yes: ExtractedCheckbox,
    pub no: ExtractedCheckbox,
    /// `Some(true)` only if yes is checked and no is not, symmetric for
    /// `Some(false)`; `None` when both or neither are checked.
    pub value: Option<bool>,
    /// Nearest preceding text that is not a checkbox line.
    pub question: String,
}

impl CheckboxPair {
    pub fn resolve(yes_checked: bool, no_checked: bool) -> Option<bool> {
        match (yes_checked, no_checked) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }
}

/// A checkbox outside any pair, named after its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandaloneCheckbox {
    pub checkbox: ExtractedCheckbox,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairDetection {
    pub pairs: Vec<CheckboxPair>,
    pub standalone: Vec<StandaloneCheckbox>,
}

/// A target pair linked to the reference pair it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct PairLink {
    pub target: CheckboxPair,
    pub reference_value: Option<bool>,
}

impl PairLink {
    /// Final (yes, no) states once `decisions` are applied over the current ones.
    pub fn final_states(&self, decisions: &[CheckboxDecision]) -> (bool, bool) {
        let state = |checkbox: &ExtractedCheckbox| {
            decisions
                .iter()
                .rev()
                .find(|d| d.index == checkbox.index)
                .map(|d| d.checked)
                .unwrap_or(checkbox.checked)
        };
        (state(&self.target.yes), state(&self.target.no))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckboxStats {
    pub reference_checkboxes: usize,
    pub target_checkboxes: usize,
    pub reference_pairs: usize,
    pub target_pairs: usize,
    /// Decisions written to the target.
    pub transferred: usize,
    /// Decisions that flipped a box.
    pub changed: usize,
    /// Pairs left untouched because the reference value was ambiguous.
    pub ambiguous: usize,
    /// Target pairs with no reference counterpart.
    pub unmatched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::checkbox;

    #[test]
    fn resolve_is_tri_state() {
        assert_eq!(CheckboxPair::resolve(true, false), Some(true));
        assert_eq!(CheckboxPair::resolve(false, true), Some(false));
        assert_eq!(CheckboxPair::resolve(true, true), None);
        assert_eq!(CheckboxPair::resolve(false, false), None);
    }

    #[test]
    fn final_states_apply_decisions_over_current() {
        let link = PairLink {
            target: CheckboxPair {
                yes: checkbox(2, 4, "Oui", false),
                no: checkbox(3, 4, "Non", true),
                value: Some(false),
                question: String::new(),
            },
            reference_value: Some(true),
        };
        assert_eq!(link.final_states(&[]), (false, true));
        assert_eq!(link.final_states(&[CheckboxDecision { index: 2, checked: true }]), (true, true));
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_string(&CheckboxStats::default()).unwrap();
        assert!(json.contains("\"referenceCheckboxes\":0"));
        assert!(json.contains("\"targetPairs\":0"));
    }
}
