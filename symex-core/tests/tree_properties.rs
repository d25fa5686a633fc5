use proptest::prelude::*;
use symex_ast::Expr;
use symex_core::{build_tree, ExecutionTree};

fn sequential_forks(k: usize) -> Expr {
    Expr::block((0..k).map(|i| {
        Expr::if_else(
            Expr::eq(Expr::var(format!("in{i}")), Expr::constant(i as i64)),
            Expr::assign("x", Expr::constant(1)),
            Expr::assign("x", Expr::constant(2)),
        )
    }))
}

// `Let` values never read an assignment target: a target read only inside
// its own `Let` is not free, so it would never be seeded.
const INPUTS: &[&str] = &["a", "b", "x", "y"];
const TARGETS: &[&str] = &["p", "q"];

fn arb_operand(names: Vec<&'static str>) -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-3i64..=3).prop_map(Expr::constant),
        prop::sample::select(names).prop_map(|n| Expr::var(n)),
    ];
    leaf.prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::add(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::sub(l, r)),
            (inner.clone(), inner).prop_map(|(l, r)| Expr::mul(l, r)),
        ]
    })
}

fn arb_cond() -> impl Strategy<Value = Expr> {
    let names: Vec<&'static str> = INPUTS.iter().chain(TARGETS).copied().collect();
    (arb_operand(names.clone()), arb_operand(names), any::<bool>())
        .prop_map(|(l, r, eq)| if eq { Expr::eq(l, r) } else { Expr::ne(l, r) })
}

fn arb_program() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (prop::sample::select(TARGETS.to_vec()), arb_operand(INPUTS.to_vec()))
            .prop_map(|(name, value)| Expr::assign(name, value)),
        arb_cond().prop_map(Expr::assert),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(|stmts| Expr::block(stmts)),
            (arb_cond(), inner.clone()).prop_map(|(c, t)| Expr::if_then(c, t)),
            (arb_cond(), inner.clone(), inner).prop_map(|(c, t, e)| Expr::if_else(c, t, e)),
        ]
    })
}

fn forks_above(tree: &ExecutionTree, id: symex_core::NodeId) -> usize {
    let path = tree.path_to(id);
    path[..path.len() - 1]
        .iter()
        .filter(|p| matches!(tree.node(**p).statement, Expr::If { .. }))
        .count()
}

#[test]
fn sequential_ifs_produce_two_to_the_k_paths() {
    for k in 0..=6 {
        let tree = build_tree(&sequential_forks(k)).expect("build");
        assert_eq!(tree.leaves().len(), 1 << k, "k = {k}");
    }
}

#[test]
fn leaves_after_n_forks_carry_n_constraints() {
    let tree = build_tree(&sequential_forks(3)).expect("build");
    for leaf in tree.leaves() {
        assert_eq!(tree.node(leaf).constraints.len(), 3);
        assert_eq!(forks_above(&tree, leaf), 3);
    }
}

proptest! {
    #[test]
    fn constraints_only_grow_along_a_path(program in arb_program()) {
        let tree = build_tree(&program).expect("generated programs are well formed");
        for (id, node) in tree.iter() {
            let Some(parent) = node.parent else {
                prop_assert!(node.constraints.is_empty());
                continue;
            };
            let parent = tree.node(parent);
            prop_assert!(node.constraints.starts_with(&parent.constraints));
            let expected = parent.constraints.len()
                + usize::from(matches!(parent.statement, Expr::If { .. }));
            prop_assert_eq!(node.constraints.len(), expected);
            prop_assert_eq!(node.constraints.len(), forks_above(&tree, id));
        }
    }

    #[test]
    fn every_node_has_at_most_two_children(program in arb_program()) {
        let tree = build_tree(&program).expect("generated programs are well formed");
        for (_, node) in tree.iter() {
            let limit = if matches!(node.statement, Expr::If { .. }) { 2 } else { 1 };
            prop_assert!(node.children.len() <= limit);
            prop_assert!(!matches!(node.statement, Expr::Block(_)));
        }
    }

    #[test]
    fn both_sides_of_a_fork_start_from_the_parent_store(program in arb_program()) {
        let tree = build_tree(&program).expect("generated programs are well formed");
        for (_, node) in tree.iter() {
            if !matches!(node.statement, Expr::If { .. }) {
                continue;
            }
            for child in &node.children {
                prop_assert_eq!(&tree.node(*child).store, &node.store);
            }
        }
    }

    #[test]
    fn depth_first_visits_every_node_once(program in arb_program()) {
        let tree = build_tree(&program).expect("generated programs are well formed");
        let mut order = tree.depth_first();
        prop_assert_eq!(order.len(), tree.len());
        order.sort();
        order.dedup();
        prop_assert_eq!(order.len(), tree.len());
    }
}
