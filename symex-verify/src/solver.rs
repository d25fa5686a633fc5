#![forbid(unsafe_code)]

//! The contract between obligations and a satisfiability backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use symex_ast::{Expr, Symbolic};
use symex_core::EvalError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum VerifyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),

    #[error("symbolic input `{name}` is not declared in the solver query")]
    #[diagnostic(code(symex::verify::unknown_symbolic))]
    UnknownSymbolic { name: String },

    #[error("cannot translate {kind} `{found}` into a solver formula")]
    #[diagnostic(
        code(symex::verify::unsupported),
        help("formulas are `==`/`!=` comparisons over integer arithmetic")
    )]
    Unsupported { kind: &'static str, found: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverProfile {
    /// Small search bound, short timeout.
    #[default]
    Fast,
    /// CI-friendly medium limits.
    Ci,
    /// Large search bound, long timeout.
    Thorough,
}

impl SolverProfile {
    pub fn timeout_ms(self) -> u32 {
        match self {
            SolverProfile::Fast => 50,
            SolverProfile::Ci => 250,
            SolverProfile::Thorough => 2_000,
        }
    }

    /// Magnitude bound for every input tried by the enumeration backend.
    pub fn enumeration_bound(self) -> i64 {
        match self {
            SolverProfile::Fast => 16,
            SolverProfile::Ci => 64,
            SolverProfile::Thorough => 256,
        }
    }

    /// Maximum number of assignments the enumeration backend tries.
    pub fn enumeration_budget(self) -> u64 {
        match self {
            SolverProfile::Fast => 100_000,
            SolverProfile::Ci => 1_000_000,
            SolverProfile::Thorough => 10_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown solver profile `{0}` (expected fast, ci or thorough)")]
pub struct UnknownProfile(pub String);

impl FromStr for SolverProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(SolverProfile::Fast),
            "ci" => Ok(SolverProfile::Ci),
            "thorough" => Ok(SolverProfile::Thorough),
            _ => Err(UnknownProfile(s.to_string())),
        }
    }
}

/// One concrete integer per symbolic input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model(BTreeMap<String, i64>);

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: i64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for Model {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

/// Formulas to satisfy simultaneously, over one integer per declared input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverQuery {
    pub formulas: Vec<Expr>,
    pub variables: BTreeSet<Symbolic>,
}

impl SolverQuery {
    /// Declares exactly the symbolic inputs the formulas mention.
    pub fn new(formulas: Vec<Expr>) -> Self {
        let variables = formulas
            .iter()
            .flat_map(|f| f.symbolic_references())
            .collect();
        Self { formulas, variables }
    }

    /// Checks that every formula is a comparison over integer arithmetic and
    /// mentions only declared inputs.
    pub fn validate(&self) -> Result<(), VerifyError> {
        for formula in &self.formulas {
            let Some((_, left, right)) = formula.as_comparison() else {
                return Err(unsupported(formula));
            };
            self.validate_term(left)?;
            self.validate_term(right)?;
        }
        Ok(())
    }

    fn validate_term(&self, term: &Expr) -> Result<(), VerifyError> {
        match term {
            Expr::Const(_) => Ok(()),
            Expr::Symbolic(s) if self.variables.contains(s) => Ok(()),
            Expr::Symbolic(s) => Err(VerifyError::UnknownSymbolic {
                name: s.name().to_string(),
            }),
            Expr::Binary { op, left, right } if op.is_arithmetic() => {
                self.validate_term(left)?;
                self.validate_term(right)
            }
            other => Err(unsupported(other)),
        }
    }
}

pub(crate) fn unsupported(expr: &Expr) -> VerifyError {
    VerifyError::Unsupported {
        kind: expr.kind_name(),
        found: expr.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolverOutcome {
    Satisfiable(Model),
    Unsatisfiable,
    /// Opaque bridge failure: timeout, exhausted search, solver error.
    Unknown(String),
}

/// A satisfiability backend. Each query is independent of every other.
pub trait SolverBridge {
    /// Backend name recorded in reports.
    const NAME: &'static str;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&mut self, query: &SolverQuery) -> Result<SolverOutcome, VerifyError>;
}

/// Fallback bridge when compiled without `--features symex-verify/z3`.
///
/// This keeps the workspace buildable on machines without Z3.
pub struct NoZ3Bridge;

impl SolverBridge for NoZ3Bridge {
    const NAME: &'static str = "none";

    fn check(&mut self, query: &SolverQuery) -> Result<SolverOutcome, VerifyError> {
        query.validate()?;
        Ok(SolverOutcome::Unknown(
            "Z3 bridge is not enabled. Rebuild with `--features symex-verify/z3`.".to_string(),
        ))
    }
}

#[cfg(feature = "z3")]
pub mod z3_bridge {
    use std::collections::BTreeMap;

    use symex_ast::{BinOp, Expr};
    use tracing::trace;
    use z3::{
        ast::{Ast, Bool, Int},
        Config, Context, Params, SatResult, Solver,
    };

    use super::{unsupported, Model, SolverBridge, SolverOutcome, SolverProfile, SolverQuery, VerifyError};

    /// Owns its context. Every term is built and dropped inside one
    /// `check`, so nothing outlives the bridge.
    pub struct Z3Bridge {
        ctx: Context,
        profile: SolverProfile,
    }

    impl Z3Bridge {
        pub fn new() -> Self {
            Self::with_profile(SolverProfile::default())
        }

        pub fn with_profile(profile: SolverProfile) -> Self {
            let mut cfg = Config::new();
            cfg.set_model_generation(true);
            Self {
                ctx: Context::new(&cfg),
                profile,
            }
        }
    }

    impl Default for Z3Bridge {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SolverBridge for Z3Bridge {
        const NAME: &'static str = "z3";

        fn check(&mut self, query: &SolverQuery) -> Result<SolverOutcome, VerifyError> {
            let ctx = &self.ctx;
            let vars: BTreeMap<String, Int<'_>> = query
                .variables
                .iter()
                .map(|s| (s.name().to_string(), Int::new_const(ctx, s.name())))
                .collect();

            let solver = Solver::new(ctx);
            let mut params = Params::new(ctx);
            params.set_u32("timeout", self.profile.timeout_ms());
            // Fixed seeds keep models reproducible across runs.
            params.set_u32("smt.random_seed", 0);
            params.set_u32("sat.random_seed", 0);
            solver.set_params(&params);

            for formula in &query.formulas {
                let lowered = lower_bool(ctx, formula, &vars)?;
                trace!(%formula, smt = %lowered, "asserting");
                solver.assert(&lowered);
            }

            match solver.check() {
                SatResult::Unsat => Ok(SolverOutcome::Unsatisfiable),
                SatResult::Unknown => Ok(SolverOutcome::Unknown(
                    solver
                        .get_reason_unknown()
                        .unwrap_or_else(|| "Z3 returned unknown".to_string()),
                )),
                SatResult::Sat => {
                    let Some(z3_model) = solver.get_model() else {
                        return Ok(SolverOutcome::Unknown(
                            "Z3 reported sat without a model".to_string(),
                        ));
                    };
                    let mut model = Model::new();
                    for (name, v) in &vars {
                        match z3_model.eval(v, true).and_then(|x| x.as_i64()) {
                            Some(n) => model.insert(name.clone(), n),
                            None => {
                                return Ok(SolverOutcome::Unknown(format!(
                                    "model value of `{name}` does not fit in i64"
                                )));
                            }
                        }
                    }
                    Ok(SolverOutcome::Satisfiable(model))
                }
            }
        }
    }

    fn lower_bool<'ctx>(
        ctx: &'ctx Context,
        formula: &Expr,
        vars: &BTreeMap<String, Int<'ctx>>,
    ) -> Result<Bool<'ctx>, VerifyError> {
        let Some((op, left, right)) = formula.as_comparison() else {
            return Err(unsupported(formula));
        };
        let l = lower_int(ctx, left, vars)?;
        let r = lower_int(ctx, right, vars)?;
        Ok(match op {
            BinOp::Ne => l._eq(&r).not(),
            _ => l._eq(&r),
        })
    }

    fn lower_int<'ctx>(
        ctx: &'ctx Context,
        term: &Expr,
        vars: &BTreeMap<String, Int<'ctx>>,
    ) -> Result<Int<'ctx>, VerifyError> {
        match term {
            Expr::Const(n) => Ok(Int::from_i64(ctx, *n)),
            Expr::Symbolic(s) => vars
                .get(s.name())
                .cloned()
                .ok_or_else(|| VerifyError::UnknownSymbolic {
                    name: s.name().to_string(),
                }),
            Expr::Binary { op, left, right } if op.is_arithmetic() => {
                let l = lower_int(ctx, left, vars)?;
                let r = lower_int(ctx, right, vars)?;
                Ok(match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    _ => l * r,
                })
            }
            other => Err(unsupported(other)),
        }
    }
}
