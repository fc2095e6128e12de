//! Strategy graphs: typed nodes, accept/transform edges, and the walker.

pub mod builder;
pub mod node;
pub mod nodes;
pub mod strategy;

pub use builder::StrategyBuilder;
pub use node::{NodeBody, NodeData, NodeRef};
pub use strategy::Strategy;
