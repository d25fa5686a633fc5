#![forbid(unsafe_code)]

use rayon::prelude::*;
use symex_ast::Expr;
use symex_core::{build_tree_with, BuildOptions};
use tracing::{debug, info, trace, warn};

use crate::counterexample::Counterexample;
use crate::enumerate::EnumerationSolver;
use crate::obligations::{collect_obligations, Obligation};
use crate::report::{ObligationResult, ObligationStatus, VerificationReport};
use crate::solver::{SolverBridge, SolverOutcome, SolverProfile, VerifyError};

#[derive(Clone, Copy, Debug, Default)]
pub struct VerifyOptions {
    pub profile: SolverProfile,
    /// Stop querying after the first violated obligation.
    pub stop_at_first: bool,
    /// Dispatch obligations across the rayon pool.
    /// Controlled by env var `SYMEX_PARALLEL=1`.
    pub parallel: bool,
    pub build: BuildOptions,
}

impl VerifyOptions {
    /// Defaults, overridden by `SYMEX_SOLVER_PROFILE` and `SYMEX_PARALLEL`.
    pub fn from_env() -> Self {
        let profile = match std::env::var("SYMEX_SOLVER_PROFILE") {
            Ok(raw) => raw.parse::<SolverProfile>().unwrap_or_else(|err| {
                warn!(%err, "ignoring SYMEX_SOLVER_PROFILE");
                SolverProfile::default()
            }),
            Err(_) => SolverProfile::default(),
        };
        Self {
            profile,
            parallel: std::env::var("SYMEX_PARALLEL").ok().as_deref() == Some("1"),
            ..Self::default()
        }
    }

    /// Enumeration backend sized by `profile`.
    pub fn enumeration_solver(&self) -> EnumerationSolver {
        EnumerationSolver::with_profile(self.profile)
    }

    #[cfg(feature = "z3")]
    pub fn z3_bridge(&self) -> crate::solver::z3_bridge::Z3Bridge {
        crate::solver::z3_bridge::Z3Bridge::with_profile(self.profile)
    }
}

/// Builds the execution tree for `program` and checks every reachable
/// assertion with `bridge`.
pub fn verify_program<B: SolverBridge>(
    program: &Expr,
    bridge: &mut B,
    options: &VerifyOptions,
) -> Result<VerificationReport, VerifyError> {
    let obligations = obligations_for(program, options)?;
    verify_obligations(&obligations, bridge, options.stop_at_first)
}

/// Like [`verify_program`], but creates bridges on demand so obligations can
/// be checked in parallel when `options.parallel` is set.
pub fn verify_program_with<B, F>(
    program: &Expr,
    make_bridge: F,
    options: &VerifyOptions,
) -> Result<VerificationReport, VerifyError>
where
    B: SolverBridge,
    F: Fn() -> B + Send + Sync,
{
    let obligations = obligations_for(program, options)?;
    if options.parallel {
        verify_obligations_parallel(&obligations, make_bridge, options.stop_at_first)
    } else {
        verify_obligations(&obligations, &mut make_bridge(), options.stop_at_first)
    }
}

fn obligations_for(program: &Expr, options: &VerifyOptions) -> Result<Vec<Obligation>, VerifyError> {
    let tree = build_tree_with(program, &options.build)?;
    let obligations = collect_obligations(&tree)?;
    debug!(nodes = tree.len(), obligations = obligations.len(), "collected obligations");
    Ok(obligations)
}

pub fn verify_obligations<B: SolverBridge>(
    obligations: &[Obligation],
    bridge: &mut B,
    stop_at_first: bool,
) -> Result<VerificationReport, VerifyError> {
    info!(backend = bridge.name(), obligations = obligations.len(), "verification started");
    let mut report = VerificationReport::new(bridge.name());
    for (index, obligation) in obligations.iter().enumerate() {
        let result = check_obligation(index, obligation, bridge)?;
        let violated = matches!(result.outcome, ObligationStatus::Violated { .. });
        report.push(result);
        if violated && stop_at_first {
            debug!(index, "stopping at first violation");
            break;
        }
    }
    finish(&report);
    Ok(report)
}

/// Checks obligations on the rayon pool with one bridge per worker split.
/// `make_bridge` is only called by the pool.
/// Results keep obligation order; with `stop_at_first` everything after the
/// first violation is dropped.
pub fn verify_obligations_parallel<B, F>(
    obligations: &[Obligation],
    make_bridge: F,
    stop_at_first: bool,
) -> Result<VerificationReport, VerifyError>
where
    B: SolverBridge,
    F: Fn() -> B + Send + Sync,
{
    let backend = B::NAME;
    info!(backend, obligations = obligations.len(), parallel = true, "verification started");

    let results: Vec<ObligationResult> = obligations
        .par_iter()
        .enumerate()
        .map_init(&make_bridge, |bridge, (index, obligation)| {
            check_obligation(index, obligation, bridge)
        })
        .collect::<Result<_, _>>()?;

    let mut report = VerificationReport::new(backend);
    for result in results {
        let violated = matches!(result.outcome, ObligationStatus::Violated { .. });
        report.push(result);
        if violated && stop_at_first {
            break;
        }
    }
    finish(&report);
    Ok(report)
}

fn check_obligation<B: SolverBridge>(
    index: usize,
    obligation: &Obligation,
    bridge: &mut B,
) -> Result<ObligationResult, VerifyError> {
    let query = obligation.solver_query()?;
    trace!(index, formulas = query.formulas.len(), "solver query");
    let outcome = match bridge.check(&query)? {
        SolverOutcome::Unsatisfiable => ObligationStatus::Holds,
        SolverOutcome::Satisfiable(model) => ObligationStatus::Violated {
            counterexample: Counterexample::new(obligation, model),
        },
        SolverOutcome::Unknown(reason) => ObligationStatus::Unknown { reason },
    };
    Ok(ObligationResult {
        index,
        assertion: obligation.assertion.clone(),
        outcome,
    })
}

fn finish(report: &VerificationReport) {
    info!(
        backend = %report.backend,
        holds = report.holds,
        violated = report.violated,
        unknown = report.unknown,
        "verification finished"
    );
}
