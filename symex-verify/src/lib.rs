#![forbid(unsafe_code)]

pub mod counterexample;
pub mod enumerate;
pub mod obligations;
pub mod report;
pub mod solver;
pub mod verify;

pub use counterexample::{Counterexample, PathTrace, TraceEvent, VariableTrace};
pub use enumerate::{evaluate_formula, EnumerationSolver};
pub use obligations::{collect_obligations, Obligation};
pub use report::{ObligationResult, ObligationStatus, VerificationReport};
pub use solver::{
    Model, NoZ3Bridge, SolverBridge, SolverOutcome, SolverProfile, SolverQuery, UnknownProfile,
    VerifyError,
};
#[cfg(feature = "z3")]
pub use solver::z3_bridge::Z3Bridge;
pub use verify::{
    verify_obligations, verify_obligations_parallel, verify_program, verify_program_with,
    VerifyOptions,
};
