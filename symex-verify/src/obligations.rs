#![forbid(unsafe_code)]

//! Turns reachable assertions into solver obligations.

use symex_ast::Expr;
use symex_core::{evaluate_value, EvalError, ExecutionTree, NodeId};
use tracing::debug;

use crate::solver::{SolverQuery, VerifyError};

/// An assertion together with the path constraints that reach it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Obligation {
    /// The tree node whose statement is the assertion.
    pub node: NodeId,
    /// `Assert(c)` with `c` fully reduced under the node's store.
    pub assertion: Expr,
    pub path_constraints: Vec<Expr>,
}

impl Obligation {
    /// The asserted comparison.
    pub fn condition(&self) -> &Expr {
        match &self.assertion {
            Expr::Assert(c) => c,
            other => other,
        }
    }

    /// Asks for inputs that reach the assertion while violating it: the
    /// negated condition plus every path constraint.
    pub fn solver_query(&self) -> Result<SolverQuery, VerifyError> {
        let negated = self.condition().negate().map_err(EvalError::from)?;
        let mut formulas = Vec::with_capacity(self.path_constraints.len() + 1);
        formulas.push(negated);
        formulas.extend(self.path_constraints.iter().cloned());
        Ok(SolverQuery::new(formulas))
    }
}

/// One obligation per `Assert` node, in depth-first order with the then side
/// of every fork first.
pub fn collect_obligations(tree: &ExecutionTree) -> Result<Vec<Obligation>, EvalError> {
    let mut out = Vec::new();
    for id in tree.depth_first() {
        let node = tree.node(id);
        let Expr::Assert(c) = &node.statement else {
            continue;
        };
        let mut store = node.store.clone();
        let condition = evaluate_value(c, &mut store, "assertion")?;
        debug!(
            node = id.0,
            %condition,
            constraints = node.constraints.len(),
            "emitting obligation"
        );
        out.push(Obligation {
            node: id,
            assertion: Expr::Assert(Box::new(condition)),
            path_constraints: node.constraints.clone(),
        });
    }
    Ok(out)
}
