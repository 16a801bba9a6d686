//! Document segmentation: split both documents into sections and tables,
//! then pair reference segments with their target counterparts so matching
//! can run on small, comparable regions.

pub mod types;
pub mod segmenter;
pub mod matcher;

pub use types::*;
pub use segmenter::{should_segment, SegmentationSignals, Segmenter};
pub use matcher::{pair_segments, similarity};
