#![forbid(unsafe_code)]

//! Scope-aware static analyses over [`Expr`].

use std::collections::BTreeSet;

use miette::Diagnostic;
use thiserror::Error;

use crate::{BinOp, Expr, Symbolic, Var};

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("cannot negate {kind} `{found}`: only `==` and `!=` have a negation")]
#[diagnostic(code(symex::negate))]
pub struct NegateError {
    pub kind: &'static str,
    pub found: String,
}

impl Expr {
    /// Variables referenced without being bound earlier in the same block.
    ///
    /// Inside a `Block` a use that precedes its `Let` (in program order) is
    /// free; every use after the `Let` is not.
    pub fn free_variables(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        collect_free_variables(self, &mut out);
        out
    }

    /// Every `Symbolic` leaf in the tree.
    pub fn symbolic_references(&self) -> BTreeSet<Symbolic> {
        let mut out = BTreeSet::new();
        collect_symbolic_references(self, &mut out);
        out
    }

    /// Swaps `==` and `!=`. Any other node is a caller error.
    pub fn negate(&self) -> Result<Expr, NegateError> {
        match self {
            Expr::Binary { op, left, right } if op.is_comparison() => {
                let op = match op {
                    BinOp::Eq => BinOp::Ne,
                    _ => BinOp::Eq,
                };
                Ok(Expr::Binary {
                    op,
                    left: left.clone(),
                    right: right.clone(),
                })
            }
            other => Err(NegateError {
                kind: other.kind_name(),
                found: other.to_string(),
            }),
        }
    }
}

fn collect_free_variables(expr: &Expr, out: &mut BTreeSet<Var>) {
    match expr {
        Expr::Const(_) | Expr::Symbolic(_) => {}
        Expr::Var(v) => {
            out.insert(v.clone());
        }
        Expr::Let { target, value } => {
            let mut inner = BTreeSet::new();
            collect_free_variables(value, &mut inner);
            inner.remove(target);
            out.extend(inner);
        }
        Expr::Block(stmts) => {
            let mut bound: BTreeSet<Var> = BTreeSet::new();
            for stmt in stmts {
                let mut inner = BTreeSet::new();
                collect_free_variables(stmt, &mut inner);
                out.extend(inner.into_iter().filter(|v| !bound.contains(v)));
                if let Expr::Let { target, .. } = stmt {
                    bound.insert(target.clone());
                }
            }
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_free_variables(cond, out);
            collect_free_variables(then_branch, out);
            if let Some(e) = else_branch {
                collect_free_variables(e, out);
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_free_variables(left, out);
            collect_free_variables(right, out);
        }
        Expr::Assert(c) => collect_free_variables(c, out),
    }
}

fn collect_symbolic_references(expr: &Expr, out: &mut BTreeSet<Symbolic>) {
    match expr {
        Expr::Const(_) | Expr::Var(_) => {}
        Expr::Symbolic(s) => {
            out.insert(s.clone());
        }
        Expr::Let { value, .. } => collect_symbolic_references(value, out),
        Expr::Block(stmts) => {
            for s in stmts {
                collect_symbolic_references(s, out);
            }
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_symbolic_references(cond, out);
            collect_symbolic_references(then_branch, out);
            if let Some(e) = else_branch {
                collect_symbolic_references(e, out);
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_symbolic_references(left, out);
            collect_symbolic_references(right, out);
        }
        Expr::Assert(c) => collect_symbolic_references(c, out),
    }
}
