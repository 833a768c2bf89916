use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, TreeError>;

/// Errors reported by tree operations.
///
/// A failed mutation never leaves a tree partially modified.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A binary search tree already holds the key being inserted.
    #[error("key already present in tree")]
    DuplicateKey,

    /// The requested key, leaf hash or level does not exist.
    #[error("entry not found")]
    NotFound,

    /// A Merkle leaf index is outside the leaf sequence.
    #[error("index {index} out of range for {len} leaves")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of leaves at the time of the call.
        len: usize,
    },

    /// A Merkle tree cannot be built over, or reduced to, zero leaves.
    #[error("merkle tree requires at least one leaf")]
    EmptyInput,

    /// Snapshot encoding or decoding failed.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Snapshot was written with another digest algorithm.
    #[error("snapshot uses {found}, expected {expected}")]
    AlgorithmMismatch {
        /// Algorithm of the reading tree.
        expected: String,
        /// Algorithm recorded in the snapshot.
        found: String,
    },

    /// A node arena (decoded snapshot or converted tree) whose links or hashes do not
    /// validate.
    #[error("invalid tree structure: {0}")]
    InvalidStructure(String),

    /// A snapshot store failed to read or write.
    #[error("snapshot store error: {0}")]
    Store(String),
}
