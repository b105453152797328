//! Node placement for AI-generated content and the freeform keyword map

pub mod assigner;
pub mod keywords;

pub use assigner::{LayoutAssigner, LayoutConfig, Priority, Suggestion, ROW_HEIGHT};
pub use keywords::{Keyword, KeywordMap};
