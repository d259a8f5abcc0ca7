//! Workflow Nodes
//!
//! Built-in node implementations for the flow engine. Each node registers
//! itself through `inventory`, so linking this crate is enough for
//! `NodeRegistry::with_builtins()` to find it.
//!
//! # Categories
//!
//! - **Input**: Triggers that start a run (manual, webhook)
//! - **Control**: Nodes that route items (if/else, merge)
//! - **Processing**: Nodes that transform items (set values)

pub mod control;
pub mod input;
pub mod processing;

// Re-export all nodes for convenience
pub use control::*;
pub use input::*;
pub use processing::*;
