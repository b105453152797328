//! Quest graph model: types, merge rules and node lifecycle

pub mod graph;
pub mod ops;
pub mod types;

pub use graph::{Completion, NodeField, QuestGraph, Revert};
pub use ops::{reduce, GraphEngine, GraphOp};
pub use types::*;
