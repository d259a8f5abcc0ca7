//! Processing nodes
//!
//! Nodes that transform items.

mod set_values;

pub use set_values::SetValues;
