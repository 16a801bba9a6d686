//! Feedback message for the next oracle round.

use std::fmt::Write;

use super::types::{MatchResult, ValidationIssue};
use super::ResponseError;
use crate::pipeline::checkbox::CheckboxDecision;

/// List every blocking rule violation, then the rejected matches.
pub fn build_correction(
    iteration: usize,
    issues: &[ValidationIssue],
    matches: &[MatchResult],
    checkboxes: &[CheckboxDecision],
) -> String {
    let mut text = format!("Attempt {iteration} was rejected for these reasons:\n");
    for issue in issues.iter().filter(|i| i.is_blocking()) {
        let _ = writeln!(text, "- {}", issue.message);
    }
    let advisories: Vec<&ValidationIssue> = issues.iter().filter(|i| !i.is_blocking()).collect();
    if !advisories.is_empty() {
        let _ = writeln!(text, "Also note:");
        for issue in advisories {
            let _ = writeln!(text, "- {}", issue.message);
        }
    }

    if !matches.is_empty() {
        let _ = writeln!(text, "Your previous matches were:");
        for m in matches {
            let _ = writeln!(
                text,
                "- {} -> [{}] {} ({:.2})",
                m.tag,
                m.target_index,
                m.insertion_point.as_str(),
                m.confidence
            );
        }
    }
    if !checkboxes.is_empty() {
        let states: Vec<String> = checkboxes
            .iter()
            .map(|c| format!("{}={}", c.index, if c.checked { "checked" } else { "unchecked" }))
            .collect();
        let _ = writeln!(text, "Your previous checkbox states were: {}", states.join(", "));
    }
    text.push_str("Fix the problems above and keep the matches that were not mentioned.");
    text
}

/// Feedback when the answer could not be parsed at all.
pub fn build_parse_correction(iteration: usize, error: &ResponseError) -> String {
    format!(
        "Attempt {iteration} could not be read ({error}). Answer with one JSON object of the form \
         {{\"matches\":[...],\"checkboxes\":[...]}} and no other text."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::matched;
    use crate::pipeline::matching::{InsertionPoint, ValidationRule};

    #[test]
    fn lists_blocking_issues_then_previous_matches() {
        let issues = vec![
            ValidationIssue::blocking(ValidationRule::Collision, "Tags A and B both target paragraph 3.", vec![]),
            ValidationIssue::advisory(ValidationRule::Coverage, "2 of 5 tags are unmatched"),
        ];
        let text = build_correction(
            1,
            &issues,
            &[matched("A", 3, InsertionPoint::AfterColon)],
            &[CheckboxDecision { index: 2, checked: true }],
        );

        assert!(text.starts_with("Attempt 1 was rejected"));
        assert!(text.contains("- Tags A and B both target paragraph 3."));
        assert!(text.contains("Also note:\n- 2 of 5 tags are unmatched"));
        assert!(text.contains("- A -> [3] after_colon (0.90)"));
        assert!(text.contains("2=checked"));
    }

    #[test]
    fn parse_correction_restates_format() {
        let text = build_parse_correction(2, &ResponseError::NoJson);
        assert!(text.contains("Attempt 2 could not be read"));
        assert!(text.contains("{\"matches\":[...]"));
    }
}
