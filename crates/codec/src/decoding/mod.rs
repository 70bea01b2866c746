/// Blob payload decoding.
pub mod blob;

/// Sequencer message parsing.
pub mod message;

mod macros;
