use std::sync::Arc;

use df_core::{MemoryDocument, NodeId};
use df_eval::{Environment, Expr};
use df_graph::{
    compile, compile_function, find_cycle, BuildContext, CompileError, Graph, GraphEdit,
    NodeKind, Position, WorkspaceId,
};
use proptest::prelude::*;

fn ctx() -> BuildContext {
    BuildContext::new(Arc::new(MemoryDocument::new()))
}

fn add(graph: &mut Graph, workspace: &WorkspaceId, kind: NodeKind) -> NodeId {
    graph
        .apply(GraphEdit::AddNode {
            workspace: workspace.clone(),
            id: None,
            kind,
            name: None,
            position: Position::default(),
        })
        .unwrap()
        .node
        .unwrap()
}

fn wire(graph: &mut Graph, start: NodeId, end: NodeId, end_index: usize) {
    graph
        .apply(GraphEdit::AddConnector {
            start,
            end,
            end_index,
        })
        .unwrap();
}

/// Builds `fname(x) = x + k` in a function workspace.
fn define_adder(graph: &mut Graph, fname: &str, k: f64) {
    graph
        .apply(GraphEdit::NewFunction {
            name: fname.into(),
            category: "math".into(),
        })
        .unwrap();
    let ws = WorkspaceId::Function(fname.into());
    let x = add(graph, &ws, NodeKind::Symbol { name: "x".into() });
    let c = add(graph, &ws, NodeKind::Number { value: k });
    let sum = add(graph, &ws, NodeKind::Add);
    wire(graph, x, sum, 0);
    wire(graph, c, sum, 1);
}

#[test]
fn late_bound_call_sees_redefinition() {
    let home = WorkspaceId::Home;
    let mut graph = Graph::new();
    define_adder(&mut graph, "f", 1.0);

    let five = add(&mut graph, &home, NodeKind::Number { value: 5.0 });
    let call = add(&mut graph, &home, NodeKind::Function { symbol: "f".into() });
    wire(&mut graph, five, call, 0);

    let ctx = ctx();
    let mut env = Environment::new();
    let lambda = compile_function(&graph, graph.function("f").unwrap(), &ctx)
        .unwrap()
        .unwrap();
    env.define("f", env.evaluate(&lambda).unwrap()).unwrap();

    let compiled = compile(&graph, &home, call, &ctx).unwrap();
    assert_eq!(compiled.expr.to_string(), "(f 5)");
    assert_eq!(env.evaluate(&compiled.expr).unwrap(), Expr::Number(6.0));

    // Redefine f(x) = x + 2 without recompiling the caller.
    let mut other = Graph::new();
    define_adder(&mut other, "f", 2.0);
    let lambda = compile_function(&other, other.function("f").unwrap(), &ctx)
        .unwrap()
        .unwrap();
    env.define("f", env.evaluate(&lambda).unwrap()).unwrap();

    assert_eq!(env.evaluate(&compiled.expr).unwrap(), Expr::Number(7.0));
}

#[test]
fn function_calling_function() {
    let home = WorkspaceId::Home;
    let mut graph = Graph::new();
    define_adder(&mut graph, "inc", 1.0);

    // twice(x) = inc(inc(x))
    graph
        .apply(GraphEdit::NewFunction {
            name: "twice".into(),
            category: "math".into(),
        })
        .unwrap();
    let ws = WorkspaceId::Function("twice".into());
    let x = add(&mut graph, &ws, NodeKind::Symbol { name: "x".into() });
    let inner = add(&mut graph, &ws, NodeKind::Function { symbol: "inc".into() });
    let outer = add(&mut graph, &ws, NodeKind::Function { symbol: "inc".into() });
    wire(&mut graph, x, inner, 0);
    wire(&mut graph, inner, outer, 0);

    let ten = add(&mut graph, &home, NodeKind::Number { value: 10.0 });
    let call = add(&mut graph, &home, NodeKind::Function { symbol: "twice".into() });
    wire(&mut graph, ten, call, 0);

    let ctx = ctx();
    let mut env = Environment::new();
    for name in ["inc", "twice"] {
        let lambda = compile_function(&graph, graph.function(name).unwrap(), &ctx)
            .unwrap()
            .unwrap();
        env.define(name, env.evaluate(&lambda).unwrap()).unwrap();
    }

    let compiled = compile(&graph, &home, call, &ctx).unwrap();
    assert_eq!(env.evaluate(&compiled.expr).unwrap(), Expr::Number(12.0));
}

#[test]
fn shrinking_parameters_leaves_wired_caller_broken() {
    let home = WorkspaceId::Home;
    let mut graph = Graph::new();
    graph
        .apply(GraphEdit::NewFunction {
            name: "pick".into(),
            category: "misc".into(),
        })
        .unwrap();
    let ws = WorkspaceId::Function("pick".into());
    let a = add(&mut graph, &ws, NodeKind::Symbol { name: "a".into() });
    let b = add(&mut graph, &ws, NodeKind::Symbol { name: "b".into() });
    let out = add(&mut graph, &ws, NodeKind::Watch);
    wire(&mut graph, a, out, 0);

    let one = add(&mut graph, &home, NodeKind::Number { value: 1.0 });
    let two = add(&mut graph, &home, NodeKind::Number { value: 2.0 });
    let call = add(&mut graph, &home, NodeKind::Function { symbol: "pick".into() });
    wire(&mut graph, one, call, 0);
    wire(&mut graph, two, call, 1);

    graph.apply(GraphEdit::RemoveNode { node: b }).unwrap();
    graph.sync_callers("pick").unwrap();

    assert_eq!(graph.node(call).unwrap().inputs.len(), 2);
    assert_eq!(
        compile(&graph, &home, call, &ctx()).unwrap_err(),
        CompileError::ArityMismatch {
            node: call,
            function: "pick".into(),
            expected: 1,
            inputs: 2,
        }
    );
}

#[test]
fn removing_a_node_leaves_consumer_missing_input() {
    let home = WorkspaceId::Home;
    let mut graph = Graph::new();
    let a = add(&mut graph, &home, NodeKind::Number { value: 1.0 });
    let watch = add(&mut graph, &home, NodeKind::Watch);
    wire(&mut graph, a, watch, 0);
    graph.home.reset_dirty();

    let effect = graph.apply(GraphEdit::RemoveNode { node: a }).unwrap();

    assert_eq!(effect.dirtied, vec![watch]);
    assert!(matches!(
        compile(&graph, &home, watch, &ctx()),
        Err(CompileError::MissingInput { .. })
    ));
    assert!(find_cycle(&graph.home).is_none());
}

fn chain_strategy() -> impl Strategy<Value = Vec<(u8, f64)>> {
    proptest::collection::vec((0u8..4, -100.0f64..100.0), 1..12)
}

proptest! {
    #[test]
    fn compiling_twice_is_identical(steps in chain_strategy()) {
        let home = WorkspaceId::Home;
        let mut graph = Graph::new();
        let ctx = ctx();

        let mut acc = add(&mut graph, &home, NodeKind::Number { value: 0.0 });
        for (op, value) in steps {
            let kind = match op {
                0 => NodeKind::Add,
                1 => NodeKind::Subtract,
                2 => NodeKind::Multiply,
                _ => NodeKind::Add,
            };
            let constant = add(&mut graph, &home, NodeKind::Number { value });
            let next = add(&mut graph, &home, kind);
            wire(&mut graph, acc, next, 0);
            // op 3 fans the accumulator into both inputs.
            let rhs = if op == 3 { acc } else { constant };
            wire(&mut graph, rhs, next, 1);
            acc = next;
        }

        let first = compile(&graph, &home, acc, &ctx).unwrap();
        let second = compile(&graph, &home, acc, &ctx).unwrap();
        prop_assert_eq!(&first.expr, &second.expr);
        prop_assert_eq!(first.expr.to_string(), second.expr.to_string());
        prop_assert_eq!(first.nodes, second.nodes);
    }
}
