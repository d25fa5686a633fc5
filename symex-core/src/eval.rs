#![forbid(unsafe_code)]

//! Partial evaluation of expressions under a symbolic store.

use std::collections::BTreeMap;

use symex_ast::{BinOp, Expr, Var};

use crate::error::{EvalError, EvalResult};

/// Symbolic store: program variable -> its current (possibly symbolic) value.
pub type Store = BTreeMap<Var, Expr>;

/// Seeds a store that maps every free variable of `program` to a symbolic
/// input of the same name.
pub fn initial_store(program: &Expr) -> Store {
    program
        .free_variables()
        .into_iter()
        .map(|v| {
            let input = Expr::symbolic(v.name());
            (v, input)
        })
        .collect()
}

/// Reduces `expr` under `store`.
///
/// `Let`s mutate `store` for whatever is evaluated after them. Returns
/// `Ok(None)` when the expression has no value, which only happens for an
/// `if` without `else` whose condition is constant and false.
pub fn evaluate(expr: &Expr, store: &mut Store) -> EvalResult<Option<Expr>> {
    match expr {
        Expr::Const(_) | Expr::Symbolic(_) => Ok(Some(expr.clone())),
        Expr::Var(v) => store
            .get(v)
            .cloned()
            .map(Some)
            .ok_or_else(|| EvalError::UnboundVariable {
                name: v.name().to_string(),
            }),
        Expr::Block(stmts) => {
            let Some((last, init)) = stmts.split_last() else {
                return Err(EvalError::EmptyBlock);
            };
            for stmt in init {
                evaluate(stmt, store)?;
            }
            evaluate(last, store)
        }
        Expr::Let { target, value } => {
            let value = evaluate_value(value, store, "let value")?;
            store.insert(target.clone(), value.clone());
            Ok(Some(value))
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate_value(left, store, "left operand")?;
            let right = evaluate_value(right, store, "right operand")?;
            Ok(Some(fold_binary(*op, left, right)))
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = evaluate_condition(cond, store)?;
            match decide(&cond) {
                Some(true) => evaluate(then_branch, store),
                Some(false) => match else_branch {
                    Some(e) => evaluate(e, store),
                    None => Ok(None),
                },
                None => {
                    // Residual form: only `then` is simplified, and its bindings
                    // stay local to the branch. Forking is the tree builder's job.
                    let mut branch_store = store.clone();
                    // A `then` with no value is kept as written, so the residual
                    // may hold an unevaluated branch next to an evaluated condition.
                    let then_value = evaluate(then_branch, &mut branch_store)?
                        .unwrap_or_else(|| (**then_branch).clone());
                    Ok(Some(Expr::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_value),
                        else_branch: else_branch.clone(),
                    }))
                }
            }
        }
        Expr::Assert(c) => {
            let c = evaluate_value(c, store, "assertion")?;
            Ok(Some(Expr::Assert(Box::new(c))))
        }
    }
}

/// Like [`evaluate`], but a missing value is an error attributed to `context`.
pub fn evaluate_value(expr: &Expr, store: &mut Store, context: &'static str) -> EvalResult<Expr> {
    evaluate(expr, store)?.ok_or(EvalError::NoValue { context })
}

/// Evaluates a branch condition, which must reduce to `==` or `!=`.
pub fn evaluate_condition(cond: &Expr, store: &mut Store) -> EvalResult<Expr> {
    let value = evaluate_value(cond, store, "if condition")?;
    if value.as_comparison().is_none() {
        return Err(EvalError::InvalidCondition {
            kind: value.kind_name(),
            found: value.to_string(),
        });
    }
    Ok(value)
}

/// Decides a comparison whose operands are both constants.
pub fn decide(cond: &Expr) -> Option<bool> {
    let (op, left, right) = cond.as_comparison()?;
    let (l, r) = (left.as_const()?, right.as_const()?);
    match op {
        BinOp::Eq => Some(l == r),
        BinOp::Ne => Some(l != r),
        _ => None,
    }
}

/// Folds arithmetic over two constants. Integers are mathematical: a fold
/// that would overflow `i64` leaves the operator in place.
fn fold_binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    if let (Some(l), Some(r)) = (left.as_const(), right.as_const()) {
        let folded = match op {
            BinOp::Add => l.checked_add(r),
            BinOp::Sub => l.checked_sub(r),
            BinOp::Mul => l.checked_mul(r),
            BinOp::Eq | BinOp::Ne => None,
        };
        if let Some(n) = folded {
            return Expr::Const(n);
        }
    }
    Expr::binary(op, left, right)
}
