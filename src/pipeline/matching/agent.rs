//! The ReAct correction loop around the semantic oracle.
//!
//! ```text
//! ACT -> OBSERVE -> VERIFY -> ACCEPT
//!                          -> CORRECT -> ACT
//!                          -> EXHAUSTED (iteration budget spent or oracle failure)
//! ```
//!
//! Each step is a variant of [`Step`]; the loop is a plain `match` over the
//! current step with `AgentState::iteration` as the only counter. Exhaustion
//! keeps the best verified round and completes it with the keyword scorer; a
//! run that never produced a readable answer falls back to the full pattern
//! cascade.

use std::collections::HashSet;

use serde::Serialize;

use super::cell_groups::reconcile;
use super::correction::{build_correction, build_parse_correction};
use super::parser::{parse_matching_response, ParsedResponse};
use super::types::{
    AgentState, ExpectedPlacement, MatchResult, MatchSource, MatchingMode, PlacementStatus, ValidationIssue, ValidationRule,
};
use super::validation::{ValidationInput, Validator};
use crate::markup::{TagContext, TargetParagraph};
use crate::pipeline::candidates::{
    PairPrompt, PatternMatcher, PositionModel, PromptBuilder, PromptInput, RenderedPrompt, TargetView,
    MATCHING_SYSTEM_PROMPT,
};
use crate::pipeline::checkbox::{CheckboxDecision, PairLink};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::oracle::SemanticOracle;
use crate::pipeline_config::MappingConfig;

/// One unit of work for the loop: a tag subset against a paragraph subset.
pub struct MatchingTask<'a> {
    /// Name used in logs and dump files (`global`, `segment-2`, `checkboxes`).
    pub label: &'a str,
    pub contexts: &'a [TagContext],
    pub paragraphs: &'a [TargetParagraph],
    pub positions: &'a PositionModel,
    pub pair_links: &'a [PairLink],
    pub pair_prompts: &'a [PairPrompt],
}

/// What happened in one ACT/OBSERVE/VERIFY round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub iteration: usize,
    pub matches: usize,
    pub checkboxes: usize,
    pub discarded: usize,
    pub issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub matches: Vec<MatchResult>,
    pub checkboxes: Vec<CheckboxDecision>,
    /// `Oracle` when accepted, `Hybrid` when exhausted with oracle matches
    /// left, `PatternFallback` otherwise.
    pub mode: MatchingMode,
    pub accepted: bool,
    pub state: AgentState,
    pub rounds: Vec<RoundRecord>,
    pub oracle_error: Option<String>,
}

impl AgentOutcome {
    /// Matches that came from the oracle and survived.
    pub fn oracle_matches(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.source == MatchSource::Oracle)
            .count()
    }
}

/// A parsed round that went through validation.
#[derive(Debug, Clone)]
struct VerifiedRound {
    parsed: ParsedResponse,
    issues: Vec<ValidationIssue>,
}

impl VerifiedRound {
    fn blocking(&self) -> usize {
        self.issues.iter().filter(|i| i.is_blocking()).count()
    }

    /// Fewer blocking issues wins, then more matches.
    fn better_than(&self, other: &VerifiedRound) -> bool {
        (self.blocking(), std::cmp::Reverse(self.parsed.matches.len()))
            < (other.blocking(), std::cmp::Reverse(other.parsed.matches.len()))
    }
}

enum Step {
    Act,
    Observe { prompt: RenderedPrompt, answer: String },
    Verify { prompt: RenderedPrompt, parsed: ParsedResponse },
    Correct { round: VerifiedRound },
    Accept { round: VerifiedRound },
    Exhausted,
}

pub struct MatchingAgent<'a> {
    oracle: &'a dyn SemanticOracle,
    config: &'a MappingConfig,
    dump: Option<&'a DiagnosticDump>,
}

impl<'a> MatchingAgent<'a> {
    pub fn new(oracle: &'a dyn SemanticOracle, config: &'a MappingConfig, dump: Option<&'a DiagnosticDump>) -> Self {
        Self { oracle, config, dump }
    }

    pub fn run(&self, task: &MatchingTask<'_>) -> AgentOutcome {
        let _span = tracing::info_span!(
            "matching_run",
            run = task.label,
            tags = task.contexts.len(),
            paragraphs = task.paragraphs.len()
        )
        .entered();

        let builder = PromptBuilder::new(self.config);
        let validator = Validator::new(self.config);
        let view = TargetView::new(task.paragraphs);

        let mut state = AgentState::new(expected_placements(task));
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut correction: Option<String> = None;
        let mut best: Option<VerifiedRound> = None;
        let mut oracle_error: Option<String> = None;
        let mut step = Step::Act;

        loop {
            step = match step {
                Step::Act => {
                    if state.iteration >= self.config.max_iterations {
                        Step::Exhausted
                    } else {
                        state.iteration += 1;
                        let prompt = builder.build(&PromptInput {
                            contexts: task.contexts,
                            paragraphs: task.paragraphs,
                            positions: task.positions,
                            pairs: task.pair_prompts,
                            correction: correction.as_deref(),
                        });
                        self.dump_text(task, state.iteration, "prompt", &prompt.text);

                        match self.oracle.invoke(&prompt.text, MATCHING_SYSTEM_PROMPT) {
                            Ok(response) => Step::Observe {
                                prompt,
                                answer: response.into_text(),
                            },
                            Err(e) => {
                                tracing::warn!(
                                    oracle = %self.oracle.name(),
                                    iteration = state.iteration,
                                    error = %e,
                                    "Oracle invocation failed, leaving the loop"
                                );
                                oracle_error = Some(e.to_string());
                                Step::Exhausted
                            }
                        }
                    }
                }

                Step::Observe { prompt, answer } => {
                    self.dump_text(task, state.iteration, "response", &answer);
                    match parse_matching_response(&answer, self.config.confidence_threshold) {
                        Ok(parsed) => Step::Verify {
                            parsed: restrict_to_task(parsed, &prompt, task.pair_links),
                            prompt,
                        },
                        Err(e) => {
                            tracing::warn!(iteration = state.iteration, error = %e, "Unreadable oracle answer");
                            rounds.push(RoundRecord {
                                iteration: state.iteration,
                                matches: 0,
                                checkboxes: 0,
                                discarded: 0,
                                issues: Vec::new(),
                                parse_error: Some(e.to_string()),
                            });
                            correction = Some(build_parse_correction(state.iteration, &e));
                            Step::Act
                        }
                    }
                }

                Step::Verify { prompt, parsed } => {
                    let issues = validator.validate(&ValidationInput {
                        contexts: task.contexts,
                        view: &view,
                        matches: &parsed.matches,
                        checkboxes: &parsed.checkboxes,
                        pairs: task.pair_links,
                        allowed_indices: Some(&prompt.listed_indices),
                    });
                    state.record_round(&parsed.matches, issues.clone());
                    rounds.push(RoundRecord {
                        iteration: state.iteration,
                        matches: parsed.matches.len(),
                        checkboxes: parsed.checkboxes.len(),
                        discarded: parsed.discarded,
                        issues: issues.clone(),
                        parse_error: None,
                    });
                    if let Some(dump) = self.dump {
                        dump.json(&format!("{}-round-{}-issues", task.label, state.iteration), &issues);
                    }

                    let round = VerifiedRound { parsed, issues };
                    if best.as_ref().map_or(true, |b| round.better_than(b)) {
                        best = Some(round.clone());
                    }
                    if round.blocking() == 0 {
                        Step::Accept { round }
                    } else {
                        Step::Correct { round }
                    }
                }

                Step::Correct { round } => {
                    tracing::info!(
                        iteration = state.iteration,
                        blocking = round.blocking(),
                        satisfaction = state.satisfaction,
                        "Oracle round rejected, asking for a correction"
                    );
                    correction = Some(build_correction(
                        state.iteration,
                        &round.issues,
                        &round.parsed.matches,
                        &round.parsed.checkboxes,
                    ));
                    Step::Act
                }

                Step::Accept { round } => {
                    state.close();
                    tracing::info!(
                        iteration = state.iteration,
                        matches = round.parsed.matches.len(),
                        satisfaction = state.satisfaction,
                        "Oracle round accepted"
                    );
                    return AgentOutcome {
                        matches: reconcile(task.contexts, round.parsed.matches),
                        checkboxes: round.parsed.checkboxes,
                        mode: MatchingMode::Oracle,
                        accepted: true,
                        state,
                        rounds,
                        oracle_error,
                    };
                }

                Step::Exhausted => {
                    return self.exhausted(task, state, rounds, best, oracle_error);
                }
            };
        }
    }

    /// Best verified round minus its blocking offenders, completed by the
    /// keyword scorer; the full cascade when no round was readable.
    fn exhausted(
        &self,
        task: &MatchingTask<'_>,
        mut state: AgentState,
        rounds: Vec<RoundRecord>,
        best: Option<VerifiedRound>,
        oracle_error: Option<String>,
    ) -> AgentOutcome {
        let matcher = PatternMatcher::new(self.config);

        let Some(best) = best else {
            let matches = matcher.match_all(task.contexts, task.paragraphs, task.positions);
            tracing::warn!(
                iterations = state.iteration,
                matches = matches.len(),
                "No usable oracle answer, pattern cascade used"
            );
            mark_matched(&mut state, &matches);
            state.close();
            return AgentOutcome {
                matches,
                checkboxes: Vec::new(),
                mode: MatchingMode::PatternFallback,
                accepted: false,
                state,
                rounds,
                oracle_error,
            };
        };

        let offending: HashSet<&str> = best
            .issues
            .iter()
            .filter(|i| i.is_blocking())
            .flat_map(|i| i.tags.iter().map(String::as_str))
            .collect();
        let kept: Vec<MatchResult> = best
            .parsed
            .matches
            .iter()
            .filter(|m| !offending.contains(m.tag.as_str()))
            .cloned()
            .collect();

        let checkbox_blocked = best.issues.iter().any(|i| {
            i.is_blocking() && matches!(i.rule, ValidationRule::CheckboxExclusivity | ValidationRule::CheckboxFidelity)
        });
        let checkboxes = if checkbox_blocked {
            Vec::new()
        } else {
            best.parsed.checkboxes.clone()
        };

        let filled = matcher.fill_unmatched(task.contexts, task.paragraphs, task.positions, &kept);
        let oracle_kept = kept.len();
        let mut matches = kept;
        matches.extend(filled);
        let matches = reconcile(task.contexts, matches);

        let mode = if oracle_kept > 0 || !checkboxes.is_empty() {
            MatchingMode::Hybrid
        } else {
            MatchingMode::PatternFallback
        };
        tracing::warn!(
            iterations = state.iteration,
            oracle_kept,
            total = matches.len(),
            mode = %mode,
            "Matching loop exhausted"
        );

        mark_matched(&mut state, &matches);
        state.close();
        AgentOutcome {
            matches,
            checkboxes,
            mode,
            accepted: false,
            state,
            rounds,
            oracle_error,
        }
    }

    fn dump_text(&self, task: &MatchingTask<'_>, iteration: usize, kind: &str, text: &str) {
        if let Some(dump) = self.dump {
            dump.text(&format!("{}-round-{}-{}", task.label, iteration, kind), text);
        }
    }
}

fn expected_placements(task: &MatchingTask<'_>) -> Vec<ExpectedPlacement> {
    task.contexts
        .iter()
        .map(|c| ExpectedPlacement {
            tag: c.tag.clone(),
            expected_position: task.positions.expected(c.paragraph_index),
            template_context: c.label_text(),
            status: PlacementStatus::Pending,
        })
        .collect()
}

fn mark_matched(state: &mut AgentState, matches: &[MatchResult]) {
    for placement in &mut state.expected_placements {
        if matches.iter().any(|m| m.tag == placement.tag) {
            placement.status = PlacementStatus::Matched;
        }
    }
}

/// Drop answers about tags that were not asked and checkboxes outside the offered pairs.
fn restrict_to_task(mut parsed: ParsedResponse, prompt: &RenderedPrompt, links: &[PairLink]) -> ParsedResponse {
    let asked: HashSet<&str> = prompt.tags.iter().map(String::as_str).collect();
    let offered: HashSet<usize> = links
        .iter()
        .flat_map(|l| [l.target.yes.index, l.target.no.index])
        .collect();

    let before = parsed.matches.len() + parsed.checkboxes.len();
    parsed.matches.retain(|m| asked.contains(m.tag.as_str()));
    parsed.checkboxes.retain(|c| offered.contains(&c.index));
    let dropped = before - parsed.matches.len() - parsed.checkboxes.len();
    if dropped > 0 {
        tracing::debug!(dropped, "Oracle answered outside the request");
        parsed.discarded += dropped;
    }
    parsed
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::TagType;
    use crate::pipeline::checkbox::CheckboxPair;
    use crate::pipeline::fixtures::{cell, cell_context, checkbox, context, paragraph, paragraphs};
    use crate::pipeline::matching::InsertionPoint;
    use crate::pipeline::oracle::mock::{MockOracle, ScriptedOracle};
    use crate::pipeline::oracle::OracleError;

    const SIRET_OK: &str = r#"{"matches":[{"tag":"SIRET","target_index":3,"confidence":0.9,"insertion_point":"replace_empty"}],"checkboxes":[]}"#;

    fn siret_targets() -> Vec<TargetParagraph> {
        paragraphs(&["Raison sociale :", "", "Numéro SIRET :", ""])
    }

    fn run_task(
        oracle: &dyn SemanticOracle,
        contexts: &[TagContext],
        targets: &[TargetParagraph],
        links: &[PairLink],
    ) -> AgentOutcome {
        let config = MappingConfig::default();
        let positions = PositionModel::new(targets.len(), targets.len());
        let prompts: Vec<PairPrompt> = links
            .iter()
            .map(|l| PairPrompt {
                question: l.target.question.clone(),
                yes_index: l.target.yes.index,
                no_index: l.target.no.index,
                reference_value: l.reference_value,
            })
            .collect();
        MatchingAgent::new(oracle, &config, None).run(&MatchingTask {
            label: "global",
            contexts,
            paragraphs: targets,
            positions: &positions,
            pair_links: links,
            pair_prompts: &prompts,
        })
    }

    // ── ACCEPT ──

    #[test]
    fn clean_first_answer_is_accepted() {
        let oracle = MockOracle::new(SIRET_OK);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);

        assert!(outcome.accepted);
        assert_eq!(outcome.mode, MatchingMode::Oracle);
        assert_eq!(outcome.state.iteration, 1);
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].target_index, 3);
        assert_eq!(outcome.matches[0].insertion_point, InsertionPoint::ReplaceEmpty);
        assert_eq!(outcome.matches[0].source, MatchSource::Oracle);
        assert_eq!(outcome.state.expected_placements[0].status, PlacementStatus::Matched);
    }

    #[test]
    fn fenced_answer_with_prose_is_accepted() {
        let reply = format!("Here is the mapping:\n```json\n{SIRET_OK}\n```\nDone.");
        let oracle = MockOracle::new(reply);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);
        assert!(outcome.accepted);
    }

    // ── CORRECT ──

    #[test]
    fn implausible_answer_is_corrected_then_accepted() {
        let wrong = r#"{"matches":[{"tag":"SIRET","target_index":1,"confidence":0.9,"insertion_point":"replace_empty"}]}"#;
        let oracle = ScriptedOracle::replies(&[wrong, SIRET_OK]);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);

        assert!(outcome.accepted);
        assert_eq!(outcome.state.iteration, 2);
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(outcome.rounds[0].issues[0].rule, ValidationRule::SemanticPlausibility);
        assert_eq!(outcome.matches[0].target_index, 3);

        let prompts = oracle.prompts();
        assert!(!prompts[0].contains("Corrections to your previous answer"));
        assert!(prompts[1].contains("Attempt 1 was rejected"));
        assert!(prompts[1].contains("SIRET -> [1]"));
    }

    #[test]
    fn unreadable_answer_asks_again() {
        let oracle = ScriptedOracle::replies(&["I am not sure.", SIRET_OK]);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);

        assert!(outcome.accepted);
        assert!(outcome.rounds[0].parse_error.is_some());
        assert!(oracle.prompts()[1].contains("could not be read"));
    }

    #[test]
    fn answers_about_unknown_tags_are_ignored() {
        let reply = r#"{"matches":[{"tag":"SIRET","target_index":3,"confidence":0.9,"insertion_point":"replace_empty"},{"tag":"GHOST","target_index":1,"confidence":0.9,"insertion_point":"inline"}]}"#;
        let oracle = MockOracle::new(reply);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);

        assert!(outcome.accepted);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.rounds[0].discarded, 1);
    }

    // ── EXHAUSTED ──

    #[test]
    fn checkbox_exclusivity_violation_is_never_accepted() {
        let link = PairLink {
            target: CheckboxPair {
                yes: checkbox(0, 1, "Oui", false),
                no: checkbox(1, 1, "Non", false),
                value: None,
                question: "Êtes-vous une PME ?".into(),
            },
            reference_value: None,
        };
        let targets = paragraphs(&["Êtes-vous une PME ?", "☐ Oui ☐ Non"]);
        let both = r#"{"matches":[],"checkboxes":[{"index":0,"checked":true},{"index":1,"checked":true}]}"#;
        let oracle = MockOracle::new(both);

        let outcome = run_task(&oracle, &[], &targets, &[link]);

        assert!(!outcome.accepted);
        assert_eq!(oracle.call_count(), 3);
        assert!(outcome
            .rounds
            .iter()
            .all(|r| r.issues.iter().any(|i| i.rule == ValidationRule::CheckboxExclusivity)));
        assert!(outcome.checkboxes.is_empty());
    }

    #[test]
    fn oracle_failure_falls_back_to_pattern_cascade() {
        let oracle = ScriptedOracle::new(vec![Err(OracleError::Connection("refused".into()))]);
        let outcome = run_task(&oracle, &[context("SIRET", "Numéro SIRET :")], &siret_targets(), &[]);

        assert!(!outcome.accepted);
        assert_eq!(outcome.mode, MatchingMode::PatternFallback);
        assert!(outcome.oracle_error.as_deref().unwrap_or_default().contains("refused"));
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].target_index, 3);
        assert_eq!(outcome.matches[0].source, MatchSource::Pattern);
    }

    #[test]
    fn exhausted_run_keeps_valid_oracle_matches_and_fills_the_rest() {
        let contexts = vec![
            context("SIRET", "Numéro SIRET :"),
            context("EMAIL", "Adresse électronique :"),
        ];
        let targets = paragraphs(&["Numéro SIRET :", "", "Adresse électronique :", ""]);
        // SIRET is fine, EMAIL always lands on a paragraph with no shared keyword.
        let reply = r#"{"matches":[{"tag":"SIRET","target_index":1,"confidence":0.9,"insertion_point":"replace_empty"},{"tag":"EMAIL","target_index":0,"confidence":0.8,"insertion_point":"after_colon"}]}"#;
        let oracle = MockOracle::new(reply);

        let outcome = run_task(&oracle, &contexts, &targets, &[]);

        assert!(!outcome.accepted);
        assert_eq!(outcome.mode, MatchingMode::Hybrid);
        assert_eq!(outcome.state.iteration, 3);
        let siret = outcome.matches.iter().find(|m| m.tag == "SIRET").unwrap();
        assert_eq!((siret.target_index, siret.source), (1, MatchSource::Oracle));
        let email = outcome.matches.iter().find(|m| m.tag == "EMAIL").unwrap();
        assert_eq!(email.source, MatchSource::Pattern);
        assert_ne!(email.target_index, 1);
    }

    // ── cell groups ──

    #[test]
    fn accepted_set_keeps_cell_group_together() {
        let contexts = vec![
            cell_context("DATE_DEBUT", "Exercice", "Période", (0, 1, 1), TagType::Date),
            cell_context("DATE_FIN", "Exercice", "Période", (0, 1, 1), TagType::Date),
        ];
        let targets = vec![
            paragraph(0, "Chiffres clés"),
            cell(1, 0, 0, 0, ""),
            cell(2, 0, 0, 1, "Période"),
            cell(3, 0, 1, 0, "Exercice"),
            cell(4, 0, 1, 1, ""),
        ];
        // Only one member answered: reconciliation adds the other at the same place.
        let reply = r#"{"matches":[{"tag":"DATE_DEBUT","target_index":4,"confidence":0.9,"insertion_point":"table_cell"}]}"#;
        let oracle = MockOracle::new(reply);

        let outcome = run_task(&oracle, &contexts, &targets, &[]);

        assert!(outcome.accepted);
        let indices: Vec<usize> = outcome.matches.iter().map(|m| m.target_index).collect();
        assert_eq!(indices, vec![4, 4]);
    }
}
