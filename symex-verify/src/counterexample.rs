#![forbid(unsafe_code)]

//! Counterexamples and the variable traces that explain them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use symex_ast::Expr;
use symex_core::{ExecutionTree, NodeId};

use crate::enumerate::{evaluate_formula, evaluate_term};
use crate::obligations::Obligation;
use crate::solver::{Model, VerifyError};

/// Inputs that reach an assertion and violate it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    #[serde(skip)]
    pub node: NodeId,
    pub assertion: Expr,
    pub path_constraints: Vec<Expr>,
    pub model: Model,
}

impl Counterexample {
    pub fn new(obligation: &Obligation, model: Model) -> Self {
        Self {
            node: obligation.node,
            assertion: obligation.assertion.clone(),
            path_constraints: obligation.path_constraints.clone(),
            model,
        }
    }

    pub fn condition(&self) -> &Expr {
        match &self.assertion {
            Expr::Assert(c) => c,
            other => other,
        }
    }

    /// Re-checks the model concretely: every path constraint holds and the
    /// asserted condition does not.
    pub fn confirm(&self) -> Result<bool, VerifyError> {
        for constraint in &self.path_constraints {
            if evaluate_formula(constraint, &self.model)? != Some(true) {
                return Ok(false);
            }
        }
        Ok(evaluate_formula(self.condition(), &self.model)? == Some(false))
    }

    /// How each program variable got its value on the way to the assertion.
    pub fn trace(&self, tree: &ExecutionTree) -> PathTrace {
        PathTrace::collect(tree, self.node, &self.model)
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fails with {}", self.assertion, self.model)?;
        if !self.path_constraints.is_empty() {
            f.write_str(" when ")?;
            for (i, c) in self.path_constraints.iter().enumerate() {
                if i > 0 {
                    f.write_str(" and ")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The variable is a program input, seeded with its symbolic value.
    Input { value: Option<i64> },
    /// A `Let` on the path bound it.
    Assigned {
        step: usize,
        symbolic: Expr,
        value: Option<i64>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariableTrace {
    pub name: String,
    pub events: Vec<TraceEvent>,
    /// Concrete value at the assertion, if the model determines it.
    pub final_value: Option<i64>,
}

impl VariableTrace {
    pub fn assignment_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Assigned { .. }))
            .count()
    }

    /// e.g. `input = 2 → step 3: 2 * (?a + ?b) = 4 → final 4`
    pub fn timeline_summary(&self) -> String {
        let mut parts = Vec::with_capacity(self.events.len() + 1);
        for event in &self.events {
            parts.push(match event {
                TraceEvent::Input { value } => format!("input = {}", show(*value)),
                TraceEvent::Assigned {
                    step,
                    symbolic,
                    value,
                } => match (symbolic, value) {
                    (Expr::Const(_), _) => format!("step {step}: {symbolic}"),
                    _ => format!("step {step}: {symbolic} = {}", show(*value)),
                },
            });
        }
        parts.push(format!("final {}", show(self.final_value)));
        parts.join(" → ")
    }
}

fn show(value: Option<i64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

/// Per-variable history along one root-to-node path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PathTrace {
    /// Branch conditions taken, in path order.
    pub branches: Vec<Expr>,
    pub variables: BTreeMap<String, VariableTrace>,
}

impl PathTrace {
    pub fn collect(tree: &ExecutionTree, target: NodeId, model: &Model) -> Self {
        let path = tree.path_to(target);
        let mut trace = PathTrace::default();
        let Some(&root) = path.first() else {
            return trace;
        };

        for (var, value) in &tree.node(root).store {
            trace.variables.insert(
                var.name().to_string(),
                VariableTrace {
                    name: var.name().to_string(),
                    events: vec![TraceEvent::Input {
                        value: concrete(value, model),
                    }],
                    final_value: None,
                },
            );
        }

        for (step, pair) in path.windows(2).enumerate() {
            let (node, next) = (tree.node(pair[0]), tree.node(pair[1]));
            match &node.statement {
                Expr::Let { target, .. } => {
                    let Some(bound) = next.store.get(target) else {
                        continue;
                    };
                    let entry = trace
                        .variables
                        .entry(target.name().to_string())
                        .or_insert_with(|| VariableTrace {
                            name: target.name().to_string(),
                            events: Vec::new(),
                            final_value: None,
                        });
                    entry.events.push(TraceEvent::Assigned {
                        step,
                        symbolic: bound.clone(),
                        value: concrete(bound, model),
                    });
                }
                Expr::If { .. } => {
                    if let Some(taken) = next.constraints.last() {
                        trace.branches.push(taken.clone());
                    }
                }
                _ => {}
            }
        }

        let last = tree.node(target);
        for (var, value) in &last.store {
            if let Some(entry) = trace.variables.get_mut(var.name()) {
                entry.final_value = concrete(value, model);
            }
        }
        trace
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for c in &self.branches {
            out.push_str(&format!("branch {c}\n"));
        }
        for var in self.variables.values() {
            out.push_str(&format!("{}: {}\n", var.name, var.timeline_summary()));
        }
        out
    }
}

fn concrete(value: &Expr, model: &Model) -> Option<i64> {
    evaluate_term(value, model).ok().flatten()
}
