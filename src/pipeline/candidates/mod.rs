//! Candidate generation: the deterministic pattern cascade and the few-shot
//! prompt that asks the oracle for the same answer.

pub mod keywords;
pub mod sanitize;
pub mod view;
pub mod scorer;
pub mod pattern;
pub mod prompt;

pub use scorer::{Candidate, KeywordScorer, PositionModel};
pub use view::TargetView;
pub use pattern::PatternMatcher;
pub use prompt::{PairPrompt, PromptBuilder, PromptInput, RenderedPrompt, MATCHING_SYSTEM_PROMPT};
