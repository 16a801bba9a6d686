use std::fmt;

use serde::{Deserialize, Serialize};

/// How a tag is written into its target paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionPoint {
    /// Append after the paragraph's trailing colon.
    AfterColon,
    /// Fill a (usually empty) table cell.
    TableCell,
    /// Replace the text of a short or empty paragraph.
    ReplaceEmpty,
    /// Plain append at the end of the paragraph.
    Inline,
    /// Next to a checkbox mark.
    Checkbox,
}

impl InsertionPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AfterColon => "after_colon",
            Self::TableCell => "table_cell",
            Self::ReplaceEmpty => "replace_empty",
            Self::Inline => "inline",
            Self::Checkbox => "checkbox",
        }
    }

    /// Lenient parse of the oracle's spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "after_colon" | "colon" => Some(Self::AfterColon),
            "table_cell" | "cell" => Some(Self::TableCell),
            "replace_empty" | "replace" | "empty" => Some(Self::ReplaceEmpty),
            "inline" | "append" => Some(Self::Inline),
            "checkbox" => Some(Self::Checkbox),
            _ => None,
        }
    }
}

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Oracle,
    Pattern,
}

/// One tag placed on one target paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub tag: String,
    /// Document-global target paragraph index.
    pub target_index: usize,
    pub confidence: f32,
    pub insertion_point: InsertionPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub source: MatchSource,
}

/// Path that produced the final match set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    Oracle,
    SegmentedOracle,
    Hybrid,
    PatternFallback,
}

impl MatchingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::SegmentedOracle => "segmented_oracle",
            Self::Hybrid => "hybrid",
            Self::PatternFallback => "pattern_fallback",
        }
    }
}

impl fmt::Display for MatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Validation ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    Collision,
    CellGroup,
    SemanticPlausibility,
    Coverage,
    CheckboxExclusivity,
    CheckboxFidelity,
    IndexRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Prevents the round from being accepted.
    Blocking,
    /// Surfaced in the report only.
    Advisory,
}

/// A violated rule, as a value. Never raised as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: ValidationRule,
    pub severity: Severity,
    pub message: String,
    /// Tags the issue is about; empty for checkbox and coverage issues.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ValidationIssue {
    pub fn blocking(rule: ValidationRule, message: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            rule,
            severity: Severity::Blocking,
            message: message.into(),
            tags,
        }
    }

    pub fn advisory(rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::Advisory,
            message: message.into(),
            tags: Vec::new(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ── Agent state ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    Pending,
    Matched,
    Failed,
}

/// What the loop expects for one reference tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPlacement {
    pub tag: String,
    /// Target index predicted from the tag's relative position in the reference.
    pub expected_position: usize,
    pub template_context: String,
    pub status: PlacementStatus,
}

/// Mutable state of one matching run, owned by the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub iteration: usize,
    pub expected_placements: Vec<ExpectedPlacement>,
    pub issues: Vec<ValidationIssue>,
    /// 0..=100: share of placements matched, minus a penalty per blocking issue.
    pub satisfaction: u8,
}

impl AgentState {
    pub fn new(expected_placements: Vec<ExpectedPlacement>) -> Self {
        Self {
            iteration: 0,
            expected_placements,
            issues: Vec::new(),
            satisfaction: 0,
        }
    }

    /// Update statuses, issues and satisfaction from one verified round.
    pub fn record_round(&mut self, matches: &[MatchResult], issues: Vec<ValidationIssue>) {
        for placement in &mut self.expected_placements {
            placement.status = if matches.iter().any(|m| m.tag == placement.tag) {
                PlacementStatus::Matched
            } else {
                PlacementStatus::Pending
            };
        }

        let total = self.expected_placements.len().max(1);
        let matched = self
            .expected_placements
            .iter()
            .filter(|p| p.status == PlacementStatus::Matched)
            .count();
        let blocking = issues.iter().filter(|i| i.is_blocking()).count();
        let coverage = (matched * 100 / total) as i64;
        self.satisfaction = (coverage - 20 * blocking as i64).clamp(0, 100) as u8;
        self.issues = issues;
    }

    /// Mark every placement still pending as failed.
    pub fn close(&mut self) {
        for placement in &mut self.expected_placements {
            if placement.status == PlacementStatus::Pending {
                placement.status = PlacementStatus::Failed;
            }
        }
    }

    pub fn blocking_issues(&self) -> usize {
        self.issues.iter().filter(|i| i.is_blocking()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(tag: &str) -> ExpectedPlacement {
        ExpectedPlacement {
            tag: tag.into(),
            expected_position: 0,
            template_context: String::new(),
            status: PlacementStatus::Pending,
        }
    }

    fn matched(tag: &str) -> MatchResult {
        MatchResult {
            tag: tag.into(),
            target_index: 1,
            confidence: 0.9,
            insertion_point: InsertionPoint::Inline,
            reason: None,
            source: MatchSource::Oracle,
        }
    }

    #[test]
    fn insertion_point_parse_is_lenient() {
        assert_eq!(InsertionPoint::parse("after-colon"), Some(InsertionPoint::AfterColon));
        assert_eq!(InsertionPoint::parse("Replace Empty"), Some(InsertionPoint::ReplaceEmpty));
        assert_eq!(InsertionPoint::parse("table_cell"), Some(InsertionPoint::TableCell));
        assert_eq!(InsertionPoint::parse("somewhere"), None);
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MatchingMode::SegmentedOracle).unwrap(),
            "\"segmented_oracle\""
        );
        assert_eq!(MatchingMode::PatternFallback.to_string(), "pattern_fallback");
    }

    #[test]
    fn satisfaction_reflects_coverage_and_blocking_issues() {
        let mut state = AgentState::new(vec![placement("A"), placement("B")]);
        state.record_round(&[matched("A")], vec![]);
        assert_eq!(state.satisfaction, 50);

        state.record_round(
            &[matched("A"), matched("B")],
            vec![ValidationIssue::blocking(ValidationRule::Collision, "x", vec![])],
        );
        assert_eq!(state.satisfaction, 80);
        assert_eq!(state.blocking_issues(), 1);
    }

    #[test]
    fn close_fails_pending_placements() {
        let mut state = AgentState::new(vec![placement("A"), placement("B")]);
        state.record_round(&[matched("A")], vec![]);
        state.close();
        assert_eq!(state.expected_placements[0].status, PlacementStatus::Matched);
        assert_eq!(state.expected_placements[1].status, PlacementStatus::Failed);
    }
}
