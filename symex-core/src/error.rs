#![forbid(unsafe_code)]

use miette::Diagnostic;
use symex_ast::NegateError;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EvalError {
    #[error("unbound variable `{name}`")]
    #[diagnostic(
        code(symex::eval::unbound_variable),
        help("every free variable of the program must be seeded in the store")
    )]
    UnboundVariable { name: String },

    #[error("`if` condition must reduce to `==` or `!=`, got {kind} `{found}`")]
    #[diagnostic(code(symex::eval::invalid_condition))]
    InvalidCondition { kind: &'static str, found: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidNegation(#[from] NegateError),

    #[error("cannot evaluate an empty block")]
    #[diagnostic(code(symex::eval::empty_block))]
    EmptyBlock,

    #[error("{context} produced no value")]
    #[diagnostic(
        code(symex::eval::no_value),
        help("an `if` without `else` whose condition is false has no value")
    )]
    NoValue { context: &'static str },

    #[error("execution tree exceeded its budget of {limit} nodes")]
    #[diagnostic(code(symex::tree::node_budget))]
    NodeBudgetExceeded { limit: usize },
}
