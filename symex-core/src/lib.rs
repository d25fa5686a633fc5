#![forbid(unsafe_code)]

mod error;
pub mod eval;
pub mod tree;

pub use error::{EvalError, EvalResult};
pub use eval::{decide, evaluate, evaluate_condition, evaluate_value, initial_store, Store};
pub use tree::{build_tree, build_tree_with, BuildOptions, ExecutionNode, ExecutionTree, NodeId};
