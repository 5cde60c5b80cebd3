//! Graph to expression compiler.
//!
//! Compilation walks upstream from a root node, visiting inputs in port
//! order. A node that feeds more than one input inside the compiled tree is
//! emitted once as a `let` binding (`%1`, `%2`, ...) and referenced by
//! symbol everywhere else, so it is built and evaluated exactly once.
//! Bindings never move above an `If` branch: a node used only inside one
//! branch is bound at the head of that branch, and a node used under two
//! branches that do not nest is written out under each.
//! Calls to user-defined functions compile to calls by name; the callee is
//! looked up when the call runs, not when it is compiled.

use std::collections::{HashMap, HashSet};

use df_core::NodeId;
use df_eval::Expr;

use crate::error::{CompileError, CompileResult};
use crate::function::FunctionWorkspace;
use crate::graph::{Graph, Node, Workspace, WorkspaceId};
use crate::kind::{BuildContext, NodeKind};

/// Result of compiling one root node.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub root: NodeId,
    pub expr: Expr,
    /// Every node that contributed, dependencies first, root last.
    pub nodes: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Where an expression sits: the `If` branches enclosing it, outermost
/// first, as (if node, input port).
type Scope = Vec<(NodeId, usize)>;

/// Inputs past the test of an `If` are only evaluated when chosen.
fn is_lazy_input(node: &Node, index: usize) -> bool {
    matches!(node.kind, NodeKind::If) && index > 0
}

fn source_of(ws: &Workspace, id: NodeId, index: usize) -> CompileResult<NodeId> {
    ws.input_source(id, index)
        .ok_or(CompileError::UnknownNode { node: id })
}

struct Planner<'a> {
    graph: &'a Graph,
    ws: &'a Workspace,
    known: &'a HashMap<NodeId, Expr>,
    marks: HashMap<NodeId, Mark>,
    order: Vec<NodeId>,
}

impl<'a> Planner<'a> {
    fn node(&self, id: NodeId) -> CompileResult<&'a Node> {
        self.ws.node(id).ok_or(CompileError::UnknownNode { node: id })
    }

    /// Depth-first walk recording a post-order.
    fn visit(&mut self, id: NodeId) -> CompileResult<()> {
        match self.marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(CompileError::CyclicDependency { node: id }),
            None => {}
        }
        self.marks.insert(id, Mark::Visiting);

        if !self.known.contains_key(&id) {
            let node = self.node(id)?;
            self.check_call(node)?;

            for (index, port) in node.inputs.iter().enumerate() {
                let source = self
                    .ws
                    .input_source(id, index)
                    .ok_or_else(|| CompileError::MissingInput {
                        node: id,
                        node_name: node.name.clone(),
                        port: port.name.clone(),
                    })?;
                self.visit(source)?;
            }
        }

        self.marks.insert(id, Mark::Done);
        self.order.push(id);
        Ok(())
    }

    fn check_call(&self, node: &Node) -> CompileResult<()> {
        let NodeKind::Function { symbol } = &node.kind else {
            return Ok(());
        };
        let function = self
            .graph
            .function(symbol)
            .ok_or_else(|| CompileError::UnknownFunction {
                node: node.id,
                function: symbol.clone(),
            })?;
        let expected = function.parameters().len();
        if expected != node.inputs.len() {
            return Err(CompileError::ArityMismatch {
                node: node.id,
                function: symbol.clone(),
                expected,
                inputs: node.inputs.len(),
            });
        }
        Ok(())
    }
}

/// Decide where each shared node is bound.
///
/// Consumers come before producers in reverse post-order, so every use of a
/// node is known by the time the node itself is placed. A node is written
/// out once per outermost scope it is used in; a scope holding more than one
/// of its uses gets a binding.
fn place_bindings(
    ws: &Workspace,
    root: NodeId,
    order: &[NodeId],
    known: &HashMap<NodeId, Expr>,
) -> CompileResult<HashMap<NodeId, Vec<Scope>>> {
    let mut uses: HashMap<NodeId, Vec<Scope>> = HashMap::from([(root, vec![Scope::new()])]);
    let mut bound: HashMap<NodeId, Vec<Scope>> = HashMap::new();

    for &id in order.iter().rev() {
        let scopes = uses.remove(&id).unwrap_or_default();
        if known.contains_key(&id) {
            continue;
        }
        let mut sites: Vec<&Scope> = Vec::new();
        for scope in &scopes {
            let nested = scopes
                .iter()
                .any(|outer| outer.len() < scope.len() && scope.starts_with(outer));
            if !nested && !sites.contains(&scope) {
                sites.push(scope);
            }
        }

        for site in sites {
            let count = scopes.iter().filter(|s| s.starts_with(site)).count();
            if count > 1 {
                bound.entry(id).or_default().push(site.clone());
            }
            let node = ws.node(id).ok_or(CompileError::UnknownNode { node: id })?;
            for index in 0..node.inputs.len() {
                let mut scope = site.clone();
                if is_lazy_input(node, index) {
                    scope.push((id, index));
                }
                uses.entry(source_of(ws, id, index)?)
                    .or_default()
                    .push(scope);
            }
        }
    }
    Ok(bound)
}

struct Builder<'a> {
    ws: &'a Workspace,
    ctx: &'a BuildContext,
    known: &'a HashMap<NodeId, Expr>,
    names: HashMap<(NodeId, Scope), String>,
    /// Nodes bound at the head of each scope, producers first.
    heads: HashMap<Scope, Vec<NodeId>>,
}

impl Builder<'_> {
    /// The binding for `id` visible from `scope`, innermost first.
    fn visible(&self, id: NodeId, scope: &Scope) -> Option<&String> {
        (0..=scope.len())
            .rev()
            .find_map(|len| self.names.get(&(id, scope[..len].to_vec())))
    }

    /// An expression opening `scope`, wrapped in the bindings placed there.
    fn open(&self, id: NodeId, scope: &Scope) -> CompileResult<Expr> {
        let body = self.reference(id, scope)?;
        let Some(heads) = self.heads.get(scope) else {
            return Ok(body);
        };
        let mut bindings = Vec::with_capacity(heads.len());
        for &bound in heads {
            let name = self
                .names
                .get(&(bound, scope.clone()))
                .ok_or(CompileError::UnknownNode { node: bound })?;
            bindings.push((name.clone(), self.write(bound, scope)?));
        }
        Ok(Expr::Let {
            bindings,
            body: Box::new(body),
        })
    }

    fn reference(&self, id: NodeId, scope: &Scope) -> CompileResult<Expr> {
        match self.visible(id, scope) {
            Some(name) => Ok(Expr::symbol(name.clone())),
            None => self.write(id, scope),
        }
    }

    /// Build the node itself, ignoring any binding of it.
    fn write(&self, id: NodeId, scope: &Scope) -> CompileResult<Expr> {
        if let Some(value) = self.known.get(&id) {
            return Ok(value.clone());
        }
        let node = self.ws.node(id).ok_or(CompileError::UnknownNode { node: id })?;
        let mut inputs = Vec::with_capacity(node.inputs.len());
        for index in 0..node.inputs.len() {
            let source = source_of(self.ws, id, index)?;
            let arg = if is_lazy_input(node, index) {
                let mut inner = scope.clone();
                inner.push((id, index));
                self.open(source, &inner)?
            } else {
                self.reference(source, scope)?
            };
            inputs.push(arg);
        }
        (node.kind.entry().build)(node, inputs, self.ctx)
    }
}

/// Compile `root` in `workspace` into an expression.
///
/// Pure over the graph: no node state changes. Compiling the same graph
/// twice yields structurally identical expressions.
pub fn compile(
    graph: &Graph,
    workspace: &WorkspaceId,
    root: NodeId,
    ctx: &BuildContext,
) -> CompileResult<Compiled> {
    compile_with(graph, workspace, root, ctx, &HashMap::new())
}

/// Like [`compile`], but nodes in `known` stand for their value: they are
/// emitted as that value and their upstream is not visited.
pub fn compile_with(
    graph: &Graph,
    workspace: &WorkspaceId,
    root: NodeId,
    ctx: &BuildContext,
    known: &HashMap<NodeId, Expr>,
) -> CompileResult<Compiled> {
    let ws = graph
        .workspace(workspace)
        .ok_or(CompileError::UnknownNode { node: root })?;

    let mut planner = Planner {
        graph,
        ws,
        known,
        marks: HashMap::new(),
        order: Vec::new(),
    };
    planner.visit(root)?;
    let order = planner.order;

    let bound = place_bindings(ws, root, &order, known)?;
    let mut builder = Builder {
        ws,
        ctx,
        known,
        names: HashMap::new(),
        heads: HashMap::new(),
    };
    for id in &order {
        for scope in bound.get(id).into_iter().flatten() {
            let name = format!("%{}", builder.names.len() + 1);
            builder.names.insert((*id, scope.clone()), name);
            builder.heads.entry(scope.clone()).or_default().push(*id);
        }
    }
    let expr = builder.open(root, &Scope::new())?;

    Ok(Compiled {
        root,
        expr,
        nodes: order,
    })
}

/// Nodes reached from more than one of a pass's roots.
///
/// A pass evaluates its roots one after another; a node upstream of several
/// of them must still run once per pass. The scheduler evaluates these
/// ahead of the first root that needs them and hands the values to later
/// roots through [`compile_with`].
#[derive(Debug, Clone, Default)]
pub struct PassPlan {
    /// Shared nodes, producers first.
    shared: Vec<NodeId>,
}

impl PassPlan {
    pub fn new(ws: &Workspace, roots: &[NodeId]) -> Self {
        let mut reach: HashMap<NodeId, usize> = HashMap::new();
        let mut order = Vec::new();
        let mut placed = HashSet::new();
        for &root in roots {
            let mut seen = HashSet::new();
            upstream(ws, root, false, &HashMap::new(), &mut seen, &mut Vec::new());
            for id in seen {
                *reach.entry(id).or_insert(0) += 1;
            }
            upstream(ws, root, false, &HashMap::new(), &mut placed, &mut order);
        }
        let is_shared = |id: &NodeId| reach.get(id).copied().unwrap_or(0) > 1;
        // Only the outermost shared nodes; their upstream comes along.
        let shared = order
            .into_iter()
            .filter(|id| {
                is_shared(id)
                    && ws
                        .consumers(*id)
                        .iter()
                        .any(|c| reach.contains_key(c) && !is_shared(c))
            })
            .collect();
        Self { shared }
    }

    pub fn shared(&self) -> &[NodeId] {
        &self.shared
    }

    /// Shared nodes `root` evaluates whatever its `If` tests decide and that
    /// have no value in `done` yet, producers first.
    pub fn needed_by(
        &self,
        ws: &Workspace,
        root: NodeId,
        done: &HashMap<NodeId, Expr>,
    ) -> Vec<NodeId> {
        if self.shared.is_empty() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        upstream(ws, root, true, done, &mut seen, &mut Vec::new());
        self.shared
            .iter()
            .copied()
            .filter(|id| seen.contains(id) && !done.contains_key(id))
            .collect()
    }
}

/// Post-order walk upstream of `id`, skipping nodes already in `seen` and
/// not descending past nodes in `stop`. With `strict` set the walk stays
/// out of `If` branches.
fn upstream(
    ws: &Workspace,
    id: NodeId,
    strict: bool,
    stop: &HashMap<NodeId, Expr>,
    seen: &mut HashSet<NodeId>,
    order: &mut Vec<NodeId>,
) {
    if !seen.insert(id) {
        return;
    }
    if let Some(node) = ws.node(id).filter(|_| !stop.contains_key(&id)) {
        for index in 0..node.inputs.len() {
            if strict && is_lazy_input(node, index) {
                continue;
            }
            if let Some(source) = ws.input_source(id, index) {
                upstream(ws, source, strict, stop, seen, order);
            }
        }
    }
    order.push(id);
}

/// The sink used as a function's body: the first sink that is not a bare
/// parameter, else the first sink.
pub fn function_body(function: &FunctionWorkspace) -> Option<NodeId> {
    let ws = &function.workspace;
    ws.nodes()
        .filter(|n| n.is_sink())
        .find(|n| !matches!(n.kind, NodeKind::Symbol { .. }))
        .or_else(|| ws.nodes().find(|n| n.is_sink()))
        .map(|n| n.id)
}

/// Compile a function workspace into `(lambda (params..) body)`.
/// An empty workspace has no definition.
pub fn compile_function(
    graph: &Graph,
    function: &FunctionWorkspace,
    ctx: &BuildContext,
) -> CompileResult<Option<Expr>> {
    let Some(body) = function_body(function) else {
        return Ok(None);
    };
    let compiled = compile(graph, function.workspace.id(), body, ctx)?;
    Ok(Some(Expr::lambda(function.parameters(), compiled.expr)))
}

/// Whether evaluating `node` may touch the document, looking through calls
/// into user functions.
pub fn requires_transaction(graph: &Graph, node: &Node) -> bool {
    fn visit(graph: &Graph, node: &Node, seen: &mut HashSet<String>) -> bool {
        if node.kind.requires_transaction() {
            return true;
        }
        let NodeKind::Function { symbol } = &node.kind else {
            return false;
        };
        if !seen.insert(symbol.clone()) {
            return false;
        }
        graph
            .function(symbol)
            .is_some_and(|f| f.workspace.nodes().any(|n| visit(graph, n, seen)))
    }
    visit(graph, node, &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use df_core::MemoryDocument;
    use df_eval::Environment;
    use std::sync::Arc;

    fn ctx() -> BuildContext {
        BuildContext::new(Arc::new(MemoryDocument::new()))
    }

    fn add_node(ws: &mut Workspace, kind: NodeKind) -> NodeId {
        ws.add_node(Node::new(NodeId::new(), kind)).unwrap()
    }

    #[test]
    fn three_plus_four() {
        let mut graph = Graph::new();
        let a = add_node(&mut graph.home, NodeKind::Number { value: 3.0 });
        let b = add_node(&mut graph.home, NodeKind::Number { value: 4.0 });
        let sum = add_node(&mut graph.home, NodeKind::Add);
        graph.home.connect(a, sum, 0).unwrap();
        graph.home.connect(b, sum, 1).unwrap();

        let compiled = compile(&graph, &WorkspaceId::Home, sum, &ctx()).unwrap();
        assert_eq!(compiled.expr.to_string(), "(+ 3 4)");
        assert_eq!(compiled.nodes, vec![a, b, sum]);
        assert_eq!(
            Environment::new().evaluate(&compiled.expr).unwrap(),
            Expr::Number(7.0)
        );
    }

    #[test]
    fn port_order_decides_argument_order() {
        let mut graph = Graph::new();
        let a = add_node(&mut graph.home, NodeKind::Number { value: 10.0 });
        let b = add_node(&mut graph.home, NodeKind::Number { value: 4.0 });
        let diff = add_node(&mut graph.home, NodeKind::Subtract);
        // Connect in reverse order of ports.
        graph.home.connect(b, diff, 1).unwrap();
        graph.home.connect(a, diff, 0).unwrap();

        let compiled = compile(&graph, &WorkspaceId::Home, diff, &ctx()).unwrap();
        assert_eq!(compiled.expr.to_string(), "(- 10 4)");
    }

    #[test]
    fn fan_out_is_bound_once() {
        let mut graph = Graph::new();
        let a = add_node(&mut graph.home, NodeKind::Number { value: 2.0 });
        let b = add_node(&mut graph.home, NodeKind::Number { value: 1.0 });
        let shared = add_node(&mut graph.home, NodeKind::Add);
        let square = add_node(&mut graph.home, NodeKind::Multiply);
        graph.home.connect(a, shared, 0).unwrap();
        graph.home.connect(b, shared, 1).unwrap();
        graph.home.connect(shared, square, 0).unwrap();
        graph.home.connect(shared, square, 1).unwrap();

        let compiled = compile(&graph, &WorkspaceId::Home, square, &ctx()).unwrap();
        assert_eq!(
            compiled.expr.to_string(),
            "(let ((%1 (+ 2 1))) (* %1 %1))"
        );
        assert_eq!(
            Environment::new().evaluate(&compiled.expr).unwrap(),
            Expr::Number(9.0)
        );
    }

    fn connect_all(ws: &mut Workspace, end: NodeId, sources: &[NodeId]) {
        for (index, source) in sources.iter().enumerate() {
            ws.connect(*source, end, index).unwrap();
        }
    }

    #[test]
    fn untaken_branch_keeps_its_bindings() {
        let mut graph = Graph::new();
        let ws = &mut graph.home;
        let yes = add_node(ws, NodeKind::Boolean { value: true });
        let five = add_node(ws, NodeKind::Number { value: 5.0 });
        let one = add_node(ws, NodeKind::Number { value: 1.0 });
        let zero = add_node(ws, NodeKind::Number { value: 0.0 });
        let divide = add_node(ws, NodeKind::Divide);
        let sum = add_node(ws, NodeKind::Add);
        let choose = add_node(ws, NodeKind::If);
        connect_all(ws, divide, &[one, zero]);
        connect_all(ws, sum, &[divide, divide]);
        connect_all(ws, choose, &[yes, five, sum]);

        let compiled = compile(&graph, &WorkspaceId::Home, choose, &ctx()).unwrap();
        assert_eq!(
            compiled.expr.to_string(),
            "(if true 5 (let ((%1 (/ 1 0))) (+ %1 %1)))"
        );
        assert_eq!(
            Environment::new().evaluate(&compiled.expr).unwrap(),
            Expr::Number(5.0)
        );
    }

    #[test]
    fn sibling_branches_each_write_the_shared_node() {
        let mut graph = Graph::new();
        let ws = &mut graph.home;
        let no = add_node(ws, NodeKind::Boolean { value: false });
        let a = add_node(ws, NodeKind::Number { value: 2.0 });
        let b = add_node(ws, NodeKind::Number { value: 1.0 });
        let shared = add_node(ws, NodeKind::Add);
        let square = add_node(ws, NodeKind::Multiply);
        let choose = add_node(ws, NodeKind::If);
        connect_all(ws, shared, &[a, b]);
        connect_all(ws, square, &[shared, shared]);
        connect_all(ws, choose, &[no, shared, square]);

        let compiled = compile(&graph, &WorkspaceId::Home, choose, &ctx()).unwrap();
        assert_eq!(
            compiled.expr.to_string(),
            "(if false (+ 2 1) (let ((%1 (+ 2 1))) (* %1 %1)))"
        );
        assert_eq!(
            Environment::new().evaluate(&compiled.expr).unwrap(),
            Expr::Number(9.0)
        );
    }

    #[test]
    fn use_in_the_test_binds_above_the_if() {
        let mut graph = Graph::new();
        let ws = &mut graph.home;
        let a = add_node(ws, NodeKind::Number { value: 2.0 });
        let b = add_node(ws, NodeKind::Number { value: 1.0 });
        let three = add_node(ws, NodeKind::Number { value: 3.0 });
        let zero = add_node(ws, NodeKind::Number { value: 0.0 });
        let shared = add_node(ws, NodeKind::Add);
        let equal = add_node(ws, NodeKind::Equal);
        let choose = add_node(ws, NodeKind::If);
        connect_all(ws, shared, &[a, b]);
        connect_all(ws, equal, &[shared, three]);
        connect_all(ws, choose, &[equal, shared, zero]);

        let compiled = compile(&graph, &WorkspaceId::Home, choose, &ctx()).unwrap();
        assert_eq!(
            compiled.expr.to_string(),
            "(let ((%1 (+ 2 1))) (if (= %1 3) %1 0))"
        );
    }

    #[test]
    fn known_values_replace_their_upstream() {
        let mut graph = Graph::new();
        let ws = &mut graph.home;
        let a = add_node(ws, NodeKind::Number { value: 2.0 });
        let b = add_node(ws, NodeKind::Number { value: 1.0 });
        let shared = add_node(ws, NodeKind::Add);
        let square = add_node(ws, NodeKind::Multiply);
        connect_all(ws, shared, &[a, b]);
        connect_all(ws, square, &[shared, shared]);

        let known = HashMap::from([(shared, Expr::Number(3.0))]);
        let compiled = compile_with(&graph, &WorkspaceId::Home, square, &ctx(), &known).unwrap();
        assert_eq!(compiled.expr.to_string(), "(* 3 3)");
        assert_eq!(compiled.nodes, vec![shared, square]);
    }

    #[test]
    fn pass_plan_finds_nodes_shared_between_roots() {
        let mut graph = Graph::new();
        let ws = &mut graph.home;
        let a = add_node(ws, NodeKind::Number { value: 2.0 });
        let b = add_node(ws, NodeKind::Number { value: 1.0 });
        let shared = add_node(ws, NodeKind::Add);
        let first = add_node(ws, NodeKind::Watch);
        let yes = add_node(ws, NodeKind::Boolean { value: true });
        let zero = add_node(ws, NodeKind::Number { value: 0.0 });
        let lazy = add_node(ws, NodeKind::If);
        let alone = add_node(ws, NodeKind::Number { value: 7.0 });
        connect_all(ws, shared, &[a, b]);
        connect_all(ws, first, &[shared]);
        connect_all(ws, lazy, &[yes, zero, shared]);

        let plan = PassPlan::new(ws, &[lazy, first, alone]);
        assert_eq!(plan.shared(), &[shared]);

        let mut done = HashMap::new();
        assert!(plan.needed_by(ws, lazy, &done).is_empty());
        assert_eq!(plan.needed_by(ws, first, &done), vec![shared]);
        done.insert(shared, Expr::Number(3.0));
        assert!(plan.needed_by(ws, first, &done).is_empty());
        assert!(plan.needed_by(ws, alone, &done).is_empty());
    }

    #[test]
    fn missing_input_names_the_port() {
        let mut graph = Graph::new();
        let a = add_node(&mut graph.home, NodeKind::Number { value: 3.0 });
        let sum = add_node(&mut graph.home, NodeKind::Add);
        graph.home.connect(a, sum, 0).unwrap();

        let err = compile(&graph, &WorkspaceId::Home, sum, &ctx()).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingInput {
                node: sum,
                node_name: "Add".into(),
                port: "y".into(),
            }
        );
    }

    #[test]
    fn unknown_function_and_arity() {
        let mut graph = Graph::new();
        let x = add_node(&mut graph.home, NodeKind::Number { value: 1.0 });
        let call = graph
            .home
            .add_node(Node::with_inputs(
                NodeId::new(),
                NodeKind::Function {
                    symbol: "inc".into(),
                },
                vec!["x".into()],
            ))
            .unwrap();
        graph.home.connect(x, call, 0).unwrap();

        assert!(matches!(
            compile(&graph, &WorkspaceId::Home, call, &ctx()),
            Err(CompileError::UnknownFunction { .. })
        ));

        graph
            .functions
            .insert("inc".into(), FunctionWorkspace::new("inc", "math"));
        assert_eq!(
            compile(&graph, &WorkspaceId::Home, call, &ctx()).unwrap_err(),
            CompileError::ArityMismatch {
                node: call,
                function: "inc".into(),
                expected: 0,
                inputs: 1,
            }
        );
    }

    #[test]
    fn function_workspace_compiles_to_lambda() {
        let mut graph = Graph::new();
        let mut inc = FunctionWorkspace::new("inc", "math");
        let x = add_node(&mut inc.workspace, NodeKind::Symbol { name: "x".into() });
        let one = add_node(&mut inc.workspace, NodeKind::Number { value: 1.0 });
        let sum = add_node(&mut inc.workspace, NodeKind::Add);
        inc.workspace.connect(x, sum, 0).unwrap();
        inc.workspace.connect(one, sum, 1).unwrap();
        graph.functions.insert("inc".into(), inc);

        let function = graph.function("inc").unwrap();
        let lambda = compile_function(&graph, function, &ctx()).unwrap().unwrap();
        assert_eq!(lambda.to_string(), "(lambda (x) (+ x 1))");

        let empty = FunctionWorkspace::new("nothing", "misc");
        assert!(compile_function(&graph, &empty, &ctx()).unwrap().is_none());
    }

    #[test]
    fn transaction_need_is_seen_through_calls() {
        let mut graph = Graph::new();
        let mut make = FunctionWorkspace::new("make", "document");
        add_node(
            &mut make.workspace,
            NodeKind::CreateEntity {
                kind: "column".into(),
            },
        );
        graph.functions.insert("make".into(), make);
        let call = graph
            .home
            .add_node(Node::new(NodeId::new(), NodeKind::Function { symbol: "make".into() }))
            .unwrap();
        let plain = add_node(&mut graph.home, NodeKind::Number { value: 1.0 });

        assert!(requires_transaction(&graph, graph.node(call).unwrap()));
        assert!(!requires_transaction(&graph, graph.node(plain).unwrap()));
    }

    #[test]
    fn compile_leaves_node_state_alone() {
        let mut graph = Graph::new();
        let a = add_node(&mut graph.home, NodeKind::Number { value: 3.0 });
        graph.home.reset_dirty();
        compile(&graph, &WorkspaceId::Home, a, &ctx()).unwrap();
        assert!(!graph.home.node(a).unwrap().is_dirty());
        assert!(graph.home.node(a).unwrap().cached.is_none());
    }
}
