//! Name index for stored variables

pub mod tree;

pub use tree::{DefaultComparator, DuplicateKey, Iter, Tree};
