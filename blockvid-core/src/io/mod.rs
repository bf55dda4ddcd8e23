//! Bitstream input/output functionality.
pub mod bitreader;
pub mod bitwriter;
#[allow(clippy::len_without_is_empty)]
pub mod codebook;
