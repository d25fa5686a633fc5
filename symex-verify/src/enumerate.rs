#![forbid(unsafe_code)]

//! Bounded enumeration backend.
//!
//! Ground formulas are decided exactly. Everything else is a search over
//! small integer assignments, tried in the order `0, 1, -1, 2, -2, ...` per
//! input, so the first model found is deterministic and small. An exhausted
//! search is `Unknown`, never `Unsatisfiable`.

use symex_ast::{BinOp, Expr};
use tracing::trace;

use crate::solver::{unsupported, Model, SolverBridge, SolverOutcome, SolverProfile, SolverQuery, VerifyError};

pub struct EnumerationSolver {
    bound: i64,
    budget: u64,
}

impl EnumerationSolver {
    pub fn new(bound: i64, budget: u64) -> Self {
        Self {
            bound: bound.max(0),
            budget,
        }
    }

    pub fn with_profile(profile: SolverProfile) -> Self {
        Self::new(profile.enumeration_bound(), profile.enumeration_budget())
    }
}

impl Default for EnumerationSolver {
    fn default() -> Self {
        Self::with_profile(SolverProfile::default())
    }
}

impl SolverBridge for EnumerationSolver {
    const NAME: &'static str = "enumeration";

    fn check(&mut self, query: &SolverQuery) -> Result<SolverOutcome, VerifyError> {
        query.validate()?;

        let empty = Model::new();
        for formula in query.formulas.iter().filter(|f| f.symbolic_references().is_empty()) {
            if evaluate_formula(formula, &empty)? == Some(false) {
                trace!(%formula, "ground formula is false");
                return Ok(SolverOutcome::Unsatisfiable);
            }
        }

        let names: Vec<&str> = query.variables.iter().map(|s| s.name()).collect();
        let candidates = candidate_values(self.bound);
        let mut digits = vec![0usize; names.len()];
        let mut tried: u64 = 0;

        loop {
            if tried >= self.budget {
                return Ok(SolverOutcome::Unknown(format!(
                    "enumeration budget of {} assignments exhausted",
                    self.budget
                )));
            }
            tried += 1;

            let model: Model = names
                .iter()
                .zip(&digits)
                .map(|(name, d)| (*name, candidates[*d]))
                .collect();
            if satisfies_all(&query.formulas, &model)? {
                trace!(%model, tried, "found model");
                return Ok(SolverOutcome::Satisfiable(model));
            }
            if !advance(&mut digits, candidates.len()) {
                break;
            }
        }

        Ok(SolverOutcome::Unknown(format!(
            "no model with every input in [-{0}, {0}]",
            self.bound
        )))
    }
}

fn satisfies_all(formulas: &[Expr], model: &Model) -> Result<bool, VerifyError> {
    for formula in formulas {
        if evaluate_formula(formula, model)? != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Odometer step, last input fastest. Returns `false` after the final digit
/// combination.
fn advance(digits: &mut [usize], radix: usize) -> bool {
    for d in digits.iter_mut().rev() {
        *d += 1;
        if *d < radix {
            return true;
        }
        *d = 0;
    }
    false
}

fn candidate_values(bound: i64) -> Vec<i64> {
    let mut out = vec![0];
    for n in 1..=bound {
        out.push(n);
        out.push(-n);
    }
    out
}

/// Evaluates a comparison under a concrete assignment.
///
/// `Ok(None)` means the arithmetic overflowed `i64`, so the formula cannot
/// be decided on machine integers.
pub fn evaluate_formula(formula: &Expr, model: &Model) -> Result<Option<bool>, VerifyError> {
    let Some((op, left, right)) = formula.as_comparison() else {
        return Err(unsupported(formula));
    };
    let (Some(l), Some(r)) = (evaluate_term(left, model)?, evaluate_term(right, model)?) else {
        return Ok(None);
    };
    Ok(Some(match op {
        BinOp::Ne => l != r,
        _ => l == r,
    }))
}

pub(crate) fn evaluate_term(term: &Expr, model: &Model) -> Result<Option<i64>, VerifyError> {
    match term {
        Expr::Const(n) => Ok(Some(*n)),
        Expr::Symbolic(s) => model
            .get(s.name())
            .map(Some)
            .ok_or_else(|| VerifyError::UnknownSymbolic {
                name: s.name().to_string(),
            }),
        Expr::Binary { op, left, right } if op.is_arithmetic() => {
            let (Some(l), Some(r)) = (evaluate_term(left, model)?, evaluate_term(right, model)?) else {
                return Ok(None);
            };
            Ok(match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                _ => l.checked_mul(r),
            })
        }
        other => Err(unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(formulas: Vec<Expr>) -> SolverQuery {
        SolverQuery::new(formulas)
    }

    #[test]
    fn candidates_alternate_by_magnitude() {
        assert_eq!(candidate_values(2), vec![0, 1, -1, 2, -2]);
        assert_eq!(candidate_values(0), vec![0]);
    }

    #[test]
    fn finds_linear_solution() {
        // 2 * (a + b) - 4 == 0, a != 0, b == 0
        let q = query(vec![
            Expr::eq(
                Expr::sub(
                    Expr::mul(Expr::constant(2), Expr::add(Expr::symbolic("a"), Expr::symbolic("b"))),
                    Expr::constant(4),
                ),
                Expr::constant(0),
            ),
            Expr::ne(Expr::symbolic("a"), Expr::constant(0)),
            Expr::eq(Expr::symbolic("b"), Expr::constant(0)),
        ]);
        let outcome = EnumerationSolver::default().check(&q).expect("valid query");
        let expected: Model = [("a", 2), ("b", 0)].into_iter().collect();
        assert_eq!(outcome, SolverOutcome::Satisfiable(expected));
    }

    #[test]
    fn ground_false_formula_is_unsatisfiable() {
        let q = query(vec![
            Expr::ne(Expr::constant(1), Expr::constant(1)),
            Expr::eq(Expr::symbolic("a"), Expr::constant(5)),
        ]);
        let outcome = EnumerationSolver::default().check(&q).expect("valid query");
        assert_eq!(outcome, SolverOutcome::Unsatisfiable);
    }

    #[test]
    fn ground_true_query_has_empty_model() {
        let q = query(vec![Expr::eq(Expr::constant(3), Expr::constant(3))]);
        let outcome = EnumerationSolver::default().check(&q).expect("valid query");
        assert_eq!(outcome, SolverOutcome::Satisfiable(Model::new()));
    }

    #[test]
    fn solution_outside_bound_is_unknown() {
        let q = query(vec![Expr::eq(Expr::symbolic("a"), Expr::constant(1_000))]);
        let outcome = EnumerationSolver::new(8, 1_000).check(&q).expect("valid query");
        assert!(matches!(outcome, SolverOutcome::Unknown(reason) if reason.contains("[-8, 8]")));
    }

    #[test]
    fn budget_limits_the_search() {
        let q = query(vec![
            Expr::eq(Expr::symbolic("a"), Expr::constant(7)),
            Expr::eq(Expr::symbolic("b"), Expr::constant(7)),
        ]);
        let outcome = EnumerationSolver::new(8, 10).check(&q).expect("valid query");
        assert!(matches!(outcome, SolverOutcome::Unknown(reason) if reason.contains("budget")));
    }

    #[test]
    fn overflow_is_undecided() {
        let f = Expr::eq(
            Expr::mul(Expr::symbolic("a"), Expr::constant(i64::MAX)),
            Expr::constant(0),
        );
        let model: Model = [("a", 2)].into_iter().collect();
        assert_eq!(evaluate_formula(&f, &model), Ok(None));
    }
}
