//! Rooted phylogenetic trees.
//!
//! An arena-indexed tree with named leaves, per-node string attributes and
//! the structural queries needed by the genetic operators: detach/attach,
//! incomparable nodes, common ancestors, outgroup re-rooting, single-child
//! collapse and Robinson-Foulds comparison. A minimal Newick reader/writer is
//! provided for construction and canonical fingerprints.

mod arena;
mod compare;
mod newick;

pub use arena::*;

/// Errors raised by tree construction and structural edits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("Newick syntax error at byte {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("Node {0} is already attached to a parent")]
    AlreadyAttached(usize),
    #[error("Attaching node {0} would create a cycle")]
    Cycle(usize),
    #[error("Node {0} does not belong to this tree")]
    UnknownNode(usize),
    #[error("The root cannot be used as outgroup")]
    OutgroupIsRoot,
    #[error("Leaf '{0}' not found")]
    LeafNotFound(String),
    #[error("Common ancestor of an empty node set")]
    EmptyNodeSet,
}
