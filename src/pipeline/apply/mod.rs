//! Application of the final match set and checkbox decisions to the target.

pub mod edits;
pub mod applicator;

pub use edits::{Edit, EditPlan};
pub use applicator::{placeholder, Applicator, ApplyReport, FailedTag};
