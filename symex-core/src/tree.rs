#![forbid(unsafe_code)]

//! Symbolic execution tree construction.
//!
//! Every control-flow path of the program becomes one root-to-leaf path in the
//! tree. Nodes carry the store and path constraints in effect *before* their
//! statement runs. `Block`s are transparent: their statements are spliced into
//! the pending queue and never get a node of their own.
//!
//! Construction runs on an explicit work stack instead of recursion so that
//! deeply nested programs cannot exhaust the call stack. Tasks are popped
//! then-branch first, so node ids are a depth-first preorder with the then
//! side of every fork before the else side.

use std::collections::VecDeque;

use symex_ast::Expr;
use tracing::{debug, trace};

use crate::error::{EvalError, EvalResult};
use crate::eval::{evaluate_condition, evaluate_value, initial_store, Store};

pub const DEFAULT_MAX_NODES: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionNode {
    pub statement: Expr,
    pub store: Store,
    pub constraints: Vec<Expr>,
    pub parent: Option<NodeId>,
    /// Zero (path end), one (straight line) or two (fork, then before else).
    pub children: Vec<NodeId>,
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionTree {
    nodes: Vec<ExecutionNode>,
    root: Option<NodeId>,
}

impl ExecutionTree {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ExecutionNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ExecutionNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Preorder walk, then-branch before else-branch at each fork.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.depth_first()
            .into_iter()
            .filter(|id| self.node(*id).children.is_empty())
            .collect()
    }

    /// Node ids from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            path.push(p);
            cur = self.node(p).parent;
        }
        path.reverse();
        path
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BuildOptions {
    /// Upper bound on the number of nodes; path count is exponential in the
    /// number of sequential branches. Capped at `u32::MAX`.
    pub max_nodes: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

pub fn build_tree(program: &Expr) -> EvalResult<ExecutionTree> {
    build_tree_with(program, &BuildOptions::default())
}

pub fn build_tree_with(program: &Expr, opts: &BuildOptions) -> EvalResult<ExecutionTree> {
    let mut builder = TreeBuilder::new(opts);
    builder.run(Task {
        parent: None,
        queue: VecDeque::from([program.clone()]),
        store: initial_store(program),
        constraints: Vec::new(),
    })?;
    debug!(
        nodes = builder.tree.len(),
        leaves = builder.tree.leaves().len(),
        "built execution tree"
    );
    Ok(builder.tree)
}

/// One pending `build(queue, store, constraints)` call.
struct Task {
    parent: Option<NodeId>,
    queue: VecDeque<Expr>,
    store: Store,
    constraints: Vec<Expr>,
}

struct TreeBuilder {
    tree: ExecutionTree,
    max_nodes: usize,
}

impl TreeBuilder {
    fn new(opts: &BuildOptions) -> Self {
        Self {
            tree: ExecutionTree::default(),
            // Node ids are `u32`.
            max_nodes: opts.max_nodes.min(u32::MAX as usize),
        }
    }

    fn run(&mut self, seed: Task) -> EvalResult<()> {
        let mut stack = vec![seed];
        while let Some(mut task) = stack.pop() {
            let Some(stmt) = next_statement(&mut task.queue) else {
                continue;
            };
            let id = self.push_node(&task, stmt.clone())?;
            let Task {
                queue,
                store,
                constraints,
                ..
            } = task;

            match stmt {
                Expr::Let { target, value } => {
                    let mut store = store;
                    let value = evaluate_value(&value, &mut store.clone(), "let value")?;
                    trace!(node = id.0, %target, %value, "binding");
                    store.insert(target, value);
                    stack.push(Task {
                        parent: Some(id),
                        queue,
                        store,
                        constraints,
                    });
                }
                Expr::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    let cond = evaluate_condition(&cond, &mut store.clone())?;
                    let negated = cond.negate()?;
                    debug!(node = id.0, %cond, depth = constraints.len(), "forking");

                    let mut then_queue = queue.clone();
                    then_queue.push_front(*then_branch);
                    let mut then_constraints = constraints.clone();
                    then_constraints.push(cond);

                    let mut else_queue = queue;
                    if let Some(e) = else_branch {
                        else_queue.push_front(*e);
                    }
                    let mut else_constraints = constraints;
                    else_constraints.push(negated);

                    // Pushed first so the then side is explored first.
                    stack.push(Task {
                        parent: Some(id),
                        queue: else_queue,
                        store: store.clone(),
                        constraints: else_constraints,
                    });
                    stack.push(Task {
                        parent: Some(id),
                        queue: then_queue,
                        store,
                        constraints: then_constraints,
                    });
                }
                _ => stack.push(Task {
                    parent: Some(id),
                    queue,
                    store,
                    constraints,
                }),
            }
        }
        Ok(())
    }

    fn push_node(&mut self, task: &Task, statement: Expr) -> EvalResult<NodeId> {
        if self.tree.nodes.len() >= self.max_nodes {
            return Err(EvalError::NodeBudgetExceeded {
                limit: self.max_nodes,
            });
        }
        let id = NodeId(self.tree.nodes.len() as u32);
        self.tree.nodes.push(ExecutionNode {
            statement,
            store: task.store.clone(),
            constraints: task.constraints.clone(),
            parent: task.parent,
            children: Vec::new(),
        });
        match task.parent {
            Some(p) => self.tree.nodes[p.index()].children.push(id),
            None => self.tree.root = Some(id),
        }
        Ok(id)
    }
}

/// Pops the next statement, splicing `Block`s into the queue on the way.
fn next_statement(queue: &mut VecDeque<Expr>) -> Option<Expr> {
    loop {
        match queue.pop_front()? {
            Expr::Block(stmts) => {
                for s in stmts.into_iter().rev() {
                    queue.push_front(s);
                }
            }
            stmt => return Some(stmt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_ast::Var;

    #[test]
    fn empty_program_has_no_root() {
        let tree = build_tree(&Expr::block([Expr::block([])])).expect("build");
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
    }

    #[test]
    fn blocks_do_not_get_nodes() {
        let program = Expr::block([
            Expr::block([Expr::assign("x", Expr::constant(1))]),
            Expr::assert(Expr::eq(Expr::var("x"), Expr::constant(1))),
        ]);
        let tree = build_tree(&program).expect("build");
        assert_eq!(tree.len(), 2);
        let root = tree.node(tree.root().expect("root"));
        assert!(matches!(root.statement, Expr::Let { .. }));
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn let_node_keeps_pre_binding_store() {
        let program = Expr::block([
            Expr::assign("x", Expr::add(Expr::var("a"), Expr::constant(1))),
            Expr::assert(Expr::ne(Expr::var("x"), Expr::constant(0))),
        ]);
        let tree = build_tree(&program).expect("build");
        let root = tree.node(tree.root().expect("root"));
        assert_eq!(root.store.get(&Var::new("x")), None);
        let child = tree.node(root.children[0]);
        assert_eq!(
            child.store.get(&Var::new("x")),
            Some(&Expr::add(Expr::symbolic("a"), Expr::constant(1)))
        );
    }

    #[test]
    fn fork_orders_then_before_else_and_negates_condition() {
        let cond = Expr::eq(Expr::var("a"), Expr::constant(0));
        let program = Expr::if_else(
            cond,
            Expr::assign("y", Expr::constant(1)),
            Expr::assign("y", Expr::constant(2)),
        );
        let tree = build_tree(&program).expect("build");
        let root = tree.node(tree.root().expect("root"));
        assert_eq!(root.children.len(), 2);

        let then_node = tree.node(root.children[0]);
        let else_node = tree.node(root.children[1]);
        assert_eq!(then_node.statement, Expr::assign("y", Expr::constant(1)));
        assert_eq!(
            then_node.constraints,
            vec![Expr::eq(Expr::symbolic("a"), Expr::constant(0))]
        );
        assert_eq!(else_node.statement, Expr::assign("y", Expr::constant(2)));
        assert_eq!(
            else_node.constraints,
            vec![Expr::ne(Expr::symbolic("a"), Expr::constant(0))]
        );
    }

    #[test]
    fn missing_else_continues_with_remaining_queue() {
        let program = Expr::block([
            Expr::if_then(
                Expr::ne(Expr::var("a"), Expr::constant(0)),
                Expr::assign("x", Expr::constant(1)),
            ),
            Expr::assert(Expr::eq(Expr::var("x"), Expr::constant(1))),
        ]);
        let tree = build_tree(&program).expect("build");
        let root = tree.node(tree.root().expect("root"));
        let else_node = tree.node(root.children[1]);
        assert!(matches!(else_node.statement, Expr::Assert(_)));
        assert_eq!(
            else_node.constraints,
            vec![Expr::eq(Expr::symbolic("a"), Expr::constant(0))]
        );
    }

    #[test]
    fn forked_branches_do_not_share_bindings() {
        let program = Expr::block([
            Expr::if_then(
                Expr::ne(Expr::var("a"), Expr::constant(0)),
                Expr::assign("x", Expr::constant(1)),
            ),
            Expr::assert(Expr::eq(Expr::var("x"), Expr::constant(0))),
        ]);
        let tree = build_tree(&program).expect("build");
        let root = tree.node(tree.root().expect("root"));
        let x = Var::new("x");

        let then_let = tree.node(root.children[0]);
        let then_assert = tree.node(then_let.children[0]);
        assert_eq!(then_assert.store.get(&x), Some(&Expr::constant(1)));

        let else_assert = tree.node(root.children[1]);
        assert!(matches!(else_assert.statement, Expr::Assert(_)));
        assert_eq!(else_assert.store.get(&x), Some(&Expr::symbolic("x")));
    }

    #[test]
    fn constant_conditions_still_fork() {
        let program = Expr::block([
            Expr::if_then(
                Expr::ne(Expr::constant(1), Expr::constant(1)),
                Expr::assert(Expr::eq(Expr::var("a"), Expr::constant(5))),
            ),
        ]);
        let tree = build_tree(&program).expect("build");
        let root = tree.node(tree.root().expect("root"));
        // The else side ends immediately, so only the then side has a node.
        assert_eq!(root.children.len(), 1);
        assert_eq!(tree.leaves().len(), 1);
    }

    #[test]
    fn invalid_condition_aborts_the_build() {
        let program = Expr::if_then(Expr::var("a"), Expr::constant(1));
        let err = build_tree(&program).expect_err("invalid condition");
        assert!(matches!(err, EvalError::InvalidCondition { .. }), "unexpected error: {err}");
    }

    #[test]
    fn node_budget_is_enforced() {
        let stmts = (0..8).map(|i| {
            Expr::if_else(
                Expr::eq(Expr::var(format!("a{i}")), Expr::constant(0)),
                Expr::assign("x", Expr::constant(1)),
                Expr::assign("x", Expr::constant(2)),
            )
        });
        let err = build_tree_with(&Expr::block(stmts), &BuildOptions { max_nodes: 64 })
            .expect_err("budget");
        assert_eq!(err, EvalError::NodeBudgetExceeded { limit: 64 });
    }

    #[test]
    fn node_budget_is_capped_at_the_id_range() {
        let builder = TreeBuilder::new(&BuildOptions { max_nodes: usize::MAX });
        assert_eq!(builder.max_nodes, u32::MAX as usize);
        let builder = TreeBuilder::new(&BuildOptions { max_nodes: 10 });
        assert_eq!(builder.max_nodes, 10);
    }

    #[test]
    fn path_to_walks_back_to_the_root() {
        let program = Expr::block([
            Expr::assign("x", Expr::constant(1)),
            Expr::assign("y", Expr::constant(2)),
            Expr::assert(Expr::ne(Expr::var("x"), Expr::var("y"))),
        ]);
        let tree = build_tree(&program).expect("build");
        let leaf = tree.leaves()[0];
        let path = tree.path_to(leaf);
        assert_eq!(path.len(), 3);
        assert_eq!(Some(path[0]), tree.root());
        assert_eq!(tree.depth_first(), path);
    }
}
