//! The dependency graph that drives every other subsystem in dbarchiver.
//!
//! A [`Graph`] is built once per run from a [`RelationSpec`] tree via
//! [`GraphBuilder`], validated for cycles, and then never mutated again.
//! [`Graph::copy_order`] and [`Graph::delete_order`] give the two
//! topological permutations the copy and delete phases iterate over.

mod builder;
mod graph;
mod ordering;

pub use builder::{GraphBuilder, RelationSpec};
pub use graph::{DepKind, EdgeMeta, Graph, Node};
pub use ordering::kahn_order;

pub use dbarchiver_errors::{CycleInfo, GraphError};
