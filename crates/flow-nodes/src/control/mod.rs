//! Control nodes
//!
//! Nodes that decide where items flow next.

mod if_else;
mod merge;

pub use if_else::{IfElse, Operation};
pub use merge::Merge;
