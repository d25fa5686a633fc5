#![forbid(unsafe_code)]

//! Per-program verification results.
//!
//! One entry per reachable assertion, in the order obligations were
//! collected, plus running counts so callers can gate on the summary alone.

use std::fmt;

use serde::Serialize;
use symex_ast::Expr;

use crate::counterexample::Counterexample;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObligationStatus {
    /// No input reaching the assertion violates it.
    Holds,
    /// A model satisfying the path and falsifying the assertion.
    Violated { counterexample: Counterexample },
    /// The backend could not decide (timeout, bound, missing solver).
    Unknown { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObligationResult {
    pub index: usize,
    pub assertion: Expr,
    #[serde(flatten)]
    pub outcome: ObligationStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub backend: String,
    pub results: Vec<ObligationResult>,
    pub holds: usize,
    pub violated: usize,
    pub unknown: usize,
}

impl VerificationReport {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, result: ObligationResult) {
        match result.outcome {
            ObligationStatus::Holds => self.holds += 1,
            ObligationStatus::Violated { .. } => self.violated += 1,
            ObligationStatus::Unknown { .. } => self.unknown += 1,
        }
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Every obligation was discharged.
    pub fn is_verified(&self) -> bool {
        self.violated == 0 && self.unknown == 0
    }

    pub fn counterexamples(&self) -> impl Iterator<Item = &Counterexample> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ObligationStatus::Violated { counterexample } => Some(counterexample),
            _ => None,
        })
    }

    pub fn first_counterexample(&self) -> Option<&Counterexample> {
        self.counterexamples().next()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} obligation(s) via {}: {} hold, {} violated, {} unknown",
            self.total(),
            self.backend,
            self.holds,
            self.violated,
            self.unknown
        )?;
        for r in &self.results {
            match &r.outcome {
                ObligationStatus::Holds => writeln!(f, "  #{} ok: {}", r.index, r.assertion)?,
                ObligationStatus::Violated { counterexample } => {
                    writeln!(f, "  #{} FAILED: {}", r.index, counterexample)?
                }
                ObligationStatus::Unknown { reason } => {
                    writeln!(f, "  #{} unknown: {} ({reason})", r.index, r.assertion)?
                }
            }
        }
        Ok(())
    }
}
