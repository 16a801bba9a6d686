//! Checkbox pairing and state transfer.
//!
//! Yes/no pairs are detected on both documents, target pairs are linked to
//! the reference pairs asking the same question, and checked states flow
//! across either verbatim or through the oracle loop.

pub mod types;
pub mod pairing;
pub mod transfer;

pub use types::*;
pub use pairing::{detect_pairs, normalize_label, polarity, standalone_tag};
pub use transfer::{link_pairs, CheckboxTransfer, CheckboxTransferer, TransferInput};
