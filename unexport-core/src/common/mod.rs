//! Shared building blocks.

mod graph_trait;

pub use graph_trait::GraphTraversal;
