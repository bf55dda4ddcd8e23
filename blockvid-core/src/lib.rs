//! Core functionality shared by the blockvid codec crates: bitstream I/O,
//! codebook support and the common error taxonomy.
#[allow(clippy::too_many_arguments)]
pub mod io;
pub mod codecs;
