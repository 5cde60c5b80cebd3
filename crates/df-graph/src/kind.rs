//! Node kind registry.
//!
//! The set of node kinds is closed: [`NodeKind`] carries each kind's saved
//! state and [`KIND_TABLE`] carries the static metadata (display name,
//! category, port names, whether the kind touches the external document) and
//! the build function turning upstream expressions into the node's own.

use std::sync::Arc;

use df_core::{Document, EntityId, ParamValue};
use df_eval::{Arity, EvalError, EvalResult, Expr, Native};

use crate::error::{CompileError, CompileResult};
use crate::graph::Node;

/// Everything a build function may need besides the node and its inputs.
#[derive(Clone)]
pub struct BuildContext {
    pub document: Arc<dyn Document>,
}

impl BuildContext {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self { document }
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext").finish_non_exhaustive()
    }
}

pub type BuildFn = fn(&Node, Vec<Expr>, &BuildContext) -> CompileResult<Expr>;

/// Node kind plus its saved state.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Number { value: f64 },
    Text { value: String },
    Boolean { value: bool },
    /// Function parameter. Only meaningful inside a function workspace.
    Symbol { name: String },
    /// Call to a user-defined function, resolved by name at call time.
    Function { symbol: String },
    Add,
    Subtract,
    Multiply,
    Divide,
    LessThan,
    GreaterThan,
    Equal,
    Not,
    And,
    Or,
    If,
    List { count: usize },
    Concat,
    /// Passes its input through; used to display a value.
    Watch,
    Selection { entity: Option<EntityId> },
    MultiSelection { entities: Vec<EntityId> },
    CreateEntity { kind: String },
    SetParameter { parameter: String },
    GetParameter { parameter: String },
    DeleteEntity,
}

/// Discriminant of [`NodeKind`], indexing [`KIND_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Number,
    Text,
    Boolean,
    Symbol,
    Function,
    Add,
    Subtract,
    Multiply,
    Divide,
    LessThan,
    GreaterThan,
    Equal,
    Not,
    And,
    Or,
    If,
    List,
    Concat,
    Watch,
    Selection,
    MultiSelection,
    CreateEntity,
    SetParameter,
    GetParameter,
    DeleteEntity,
}

/// Static description of a node kind.
pub struct KindEntry {
    pub tag: KindTag,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// Fixed input port names. `List` and `Function` size theirs at runtime.
    pub inputs: &'static [&'static str],
    /// Whether evaluating this kind mutates or reads the external document
    /// and therefore must run on the mutation context.
    pub requires_transaction: bool,
    pub build: BuildFn,
}

const BINARY: &[&str] = &["x", "y"];

pub static KIND_TABLE: &[KindEntry] = &[
    KindEntry {
        tag: KindTag::Number,
        name: "Number",
        category: "Input",
        description: "A constant number",
        inputs: &[],
        requires_transaction: false,
        build: build_constant,
    },
    KindEntry {
        tag: KindTag::Text,
        name: "Text",
        category: "Input",
        description: "A constant string",
        inputs: &[],
        requires_transaction: false,
        build: build_constant,
    },
    KindEntry {
        tag: KindTag::Boolean,
        name: "Boolean",
        category: "Input",
        description: "A constant true or false",
        inputs: &[],
        requires_transaction: false,
        build: build_constant,
    },
    KindEntry {
        tag: KindTag::Symbol,
        name: "Input",
        category: "Function",
        description: "A parameter of the enclosing function",
        inputs: &[],
        requires_transaction: false,
        build: build_symbol,
    },
    KindEntry {
        tag: KindTag::Function,
        name: "Function",
        category: "Function",
        description: "Calls a user-defined function",
        inputs: &[],
        requires_transaction: false,
        build: build_function_call,
    },
    KindEntry {
        tag: KindTag::Add,
        name: "Add",
        category: "Math",
        description: "x + y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Subtract,
        name: "Subtract",
        category: "Math",
        description: "x - y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Multiply,
        name: "Multiply",
        category: "Math",
        description: "x * y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Divide,
        name: "Divide",
        category: "Math",
        description: "x / y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::LessThan,
        name: "Less Than",
        category: "Comparison",
        description: "x < y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::GreaterThan,
        name: "Greater Than",
        category: "Comparison",
        description: "x > y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Equal,
        name: "Equal",
        category: "Comparison",
        description: "x = y",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Not,
        name: "Not",
        category: "Logic",
        description: "Negates a boolean",
        inputs: &["x"],
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::And,
        name: "And",
        category: "Logic",
        description: "True when both inputs are true",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Or,
        name: "Or",
        category: "Logic",
        description: "True when either input is true",
        inputs: BINARY,
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::If,
        name: "If",
        category: "Logic",
        description: "Chooses between two values",
        inputs: &["test", "true", "false"],
        requires_transaction: false,
        build: build_if,
    },
    KindEntry {
        tag: KindTag::List,
        name: "List",
        category: "List",
        description: "Collects its inputs into a list",
        inputs: &[],
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Concat,
        name: "Concatenate",
        category: "Text",
        description: "Joins two strings",
        inputs: &["a", "b"],
        requires_transaction: false,
        build: build_primitive_call,
    },
    KindEntry {
        tag: KindTag::Watch,
        name: "Watch",
        category: "Display",
        description: "Shows the value flowing into it",
        inputs: &["value"],
        requires_transaction: false,
        build: build_watch,
    },
    KindEntry {
        tag: KindTag::Selection,
        name: "Select Entity",
        category: "Selection",
        description: "An entity picked from the document",
        inputs: &[],
        requires_transaction: false,
        build: build_selection,
    },
    KindEntry {
        tag: KindTag::MultiSelection,
        name: "Select Entities",
        category: "Selection",
        description: "Several entities picked from the document",
        inputs: &[],
        requires_transaction: false,
        build: build_multi_selection,
    },
    KindEntry {
        tag: KindTag::CreateEntity,
        name: "Create Entity",
        category: "Document",
        description: "Creates an entity, updating it on later runs",
        inputs: &["value"],
        requires_transaction: true,
        build: build_create_entity,
    },
    KindEntry {
        tag: KindTag::SetParameter,
        name: "Set Parameter",
        category: "Document",
        description: "Writes a parameter of an entity",
        inputs: &["entity", "value"],
        requires_transaction: true,
        build: build_set_parameter,
    },
    KindEntry {
        tag: KindTag::GetParameter,
        name: "Get Parameter",
        category: "Document",
        description: "Reads a parameter of an entity",
        inputs: &["entity"],
        requires_transaction: true,
        build: build_get_parameter,
    },
    KindEntry {
        tag: KindTag::DeleteEntity,
        name: "Delete Entity",
        category: "Document",
        description: "Deletes an entity",
        inputs: &["entity"],
        requires_transaction: true,
        build: build_delete_entity,
    },
];

impl NodeKind {
    pub fn tag(&self) -> KindTag {
        match self {
            NodeKind::Number { .. } => KindTag::Number,
            NodeKind::Text { .. } => KindTag::Text,
            NodeKind::Boolean { .. } => KindTag::Boolean,
            NodeKind::Symbol { .. } => KindTag::Symbol,
            NodeKind::Function { .. } => KindTag::Function,
            NodeKind::Add => KindTag::Add,
            NodeKind::Subtract => KindTag::Subtract,
            NodeKind::Multiply => KindTag::Multiply,
            NodeKind::Divide => KindTag::Divide,
            NodeKind::LessThan => KindTag::LessThan,
            NodeKind::GreaterThan => KindTag::GreaterThan,
            NodeKind::Equal => KindTag::Equal,
            NodeKind::Not => KindTag::Not,
            NodeKind::And => KindTag::And,
            NodeKind::Or => KindTag::Or,
            NodeKind::If => KindTag::If,
            NodeKind::List { .. } => KindTag::List,
            NodeKind::Concat => KindTag::Concat,
            NodeKind::Watch => KindTag::Watch,
            NodeKind::Selection { .. } => KindTag::Selection,
            NodeKind::MultiSelection { .. } => KindTag::MultiSelection,
            NodeKind::CreateEntity { .. } => KindTag::CreateEntity,
            NodeKind::SetParameter { .. } => KindTag::SetParameter,
            NodeKind::GetParameter { .. } => KindTag::GetParameter,
            NodeKind::DeleteEntity => KindTag::DeleteEntity,
        }
    }

    pub fn entry(&self) -> &'static KindEntry {
        self.tag().entry()
    }

    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    pub fn requires_transaction(&self) -> bool {
        self.entry().requires_transaction
    }

    /// Display name for a freshly created node.
    pub fn default_name(&self) -> String {
        match self {
            NodeKind::Symbol { name } => name.clone(),
            NodeKind::Function { symbol } => symbol.clone(),
            other => other.name().to_string(),
        }
    }

    /// Input port names implied by the kind alone.
    pub fn input_names(&self) -> Vec<String> {
        match self {
            NodeKind::List { count } => (0..*count).map(|i| format!("item{}", i)).collect(),
            other => other.entry().inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// External entities this node's saved state refers to.
    pub fn referenced_entities(&self) -> Vec<EntityId> {
        match self {
            NodeKind::Selection {
                entity: Some(entity),
            } => vec![*entity],
            NodeKind::MultiSelection { entities } => entities.clone(),
            _ => Vec::new(),
        }
    }
}

impl KindTag {
    pub fn entry(self) -> &'static KindEntry {
        &KIND_TABLE[self as usize]
    }
}

/// Look up a kind by display name, as the node search would.
pub fn find_kind(name: &str) -> Option<&'static KindEntry> {
    KIND_TABLE.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

fn mismatch(node: &Node) -> CompileError {
    CompileError::InvalidNode {
        node: node.id,
        kind: node.kind.name(),
        reason: "saved state does not match the kind".to_string(),
    }
}

fn build_constant(node: &Node, _inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    match &node.kind {
        NodeKind::Number { value } => Ok(Expr::Number(*value)),
        NodeKind::Text { value } => Ok(Expr::text(value.clone())),
        NodeKind::Boolean { value } => Ok(Expr::Boolean(*value)),
        _ => Err(mismatch(node)),
    }
}

fn build_symbol(node: &Node, _inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    match &node.kind {
        NodeKind::Symbol { name } => Ok(Expr::symbol(name.clone())),
        _ => Err(mismatch(node)),
    }
}

fn build_function_call(node: &Node, inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    match &node.kind {
        NodeKind::Function { symbol } => Ok(Expr::call_named(symbol.clone(), inputs)),
        _ => Err(mismatch(node)),
    }
}

fn build_primitive_call(node: &Node, inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    let primitive = match node.kind {
        NodeKind::Add => "+",
        NodeKind::Subtract => "-",
        NodeKind::Multiply => "*",
        NodeKind::Divide => "/",
        NodeKind::LessThan => "<",
        NodeKind::GreaterThan => ">",
        NodeKind::Equal => "=",
        NodeKind::Not => "not",
        NodeKind::And => "and",
        NodeKind::Or => "or",
        NodeKind::List { .. } => "list",
        NodeKind::Concat => "concat",
        _ => return Err(mismatch(node)),
    };
    Ok(Expr::call_named(primitive, inputs))
}

fn build_if(node: &Node, inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    let [cond, then, otherwise]: [Expr; 3] = inputs.try_into().map_err(|_| mismatch(node))?;
    Ok(Expr::If {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

fn build_watch(node: &Node, inputs: Vec<Expr>, _ctx: &BuildContext) -> CompileResult<Expr> {
    inputs.into_iter().next().ok_or_else(|| mismatch(node))
}

fn build_selection(node: &Node, _inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let NodeKind::Selection { entity } = &node.kind else {
        return Err(mismatch(node));
    };
    let Some(entity) = *entity else {
        let native = Native::new("select", Arity::Exact(0), |_| {
            Err(EvalError::Runtime {
                message: "Nothing selected".to_string(),
            })
        });
        return Ok(Expr::call(Expr::Native(native), Vec::new()));
    };

    let document = Arc::clone(&ctx.document);
    let native = Native::new("select", Arity::Exact(1), move |args| {
        let id = entity_arg("select", &args[0])?;
        resolve(document.as_ref(), id)
    });
    Ok(Expr::call(Expr::Native(native), vec![Expr::text(entity.to_string())]))
}

fn build_multi_selection(node: &Node, _inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let NodeKind::MultiSelection { entities } = &node.kind else {
        return Err(mismatch(node));
    };
    let document = Arc::clone(&ctx.document);
    let native = Native::new("select-many", Arity::AtLeast(0), move |args| {
        args.iter()
            .map(|arg| resolve(document.as_ref(), entity_arg("select-many", arg)?))
            .collect::<EvalResult<Vec<_>>>()
            .map(Expr::List)
    });
    let ids = entities.iter().map(|e| Expr::text(e.to_string())).collect();
    Ok(Expr::call(Expr::Native(native), ids))
}

fn build_create_entity(node: &Node, inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let NodeKind::CreateEntity { kind } = &node.kind else {
        return Err(mismatch(node));
    };
    let document = Arc::clone(&ctx.document);
    let runs = node.runs.clone();
    let native = Native::new("create-entity", Arity::Exact(2), move |args| {
        let kind = text_arg("create-entity", &args[0])?;
        let value = expr_to_param("create-entity", &args[1])?;

        let mut record = runs.lock();
        let slot = record.count;
        record.count += 1;

        // Reuse whatever this slot produced on an earlier pass.
        if let Some(existing) = record.entities.get(slot).copied() {
            if let Some(entity) = document.resolve(existing) {
                document.set_parameter(existing, "value", value)?;
                return Ok(Expr::Container(entity));
            }
        }

        let entity = document.create_entity(kind, vec![("value".to_string(), value)])?;
        if slot < record.entities.len() {
            record.entities[slot] = entity.id;
        } else {
            record.entities.push(entity.id);
        }
        Ok(Expr::Container(entity))
    });

    let mut args = vec![Expr::text(kind.clone())];
    args.extend(inputs);
    Ok(Expr::call(Expr::Native(native), args))
}

fn build_set_parameter(node: &Node, inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let NodeKind::SetParameter { parameter } = &node.kind else {
        return Err(mismatch(node));
    };
    let document = Arc::clone(&ctx.document);
    let native = Native::new("set-parameter", Arity::Exact(3), move |args| {
        let name = text_arg("set-parameter", &args[0])?;
        let Expr::Container(entity) = &args[1] else {
            return Err(type_error("set-parameter", "container", &args[1]));
        };
        let value = expr_to_param("set-parameter", &args[2])?;
        document.set_parameter(entity.id, name, value)?;
        Ok(args[1].clone())
    });

    let mut args = vec![Expr::text(parameter.clone())];
    args.extend(inputs);
    Ok(Expr::call(Expr::Native(native), args))
}

fn build_get_parameter(node: &Node, inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let NodeKind::GetParameter { parameter } = &node.kind else {
        return Err(mismatch(node));
    };
    let document = Arc::clone(&ctx.document);
    let native = Native::new("get-parameter", Arity::Exact(2), move |args| {
        let name = text_arg("get-parameter", &args[0])?;
        let Expr::Container(entity) = &args[1] else {
            return Err(type_error("get-parameter", "container", &args[1]));
        };
        let value = document.get_parameter(entity.id, name)?;
        param_to_expr(document.as_ref(), value)
    });

    let mut args = vec![Expr::text(parameter.clone())];
    args.extend(inputs);
    Ok(Expr::call(Expr::Native(native), args))
}

fn build_delete_entity(_node: &Node, inputs: Vec<Expr>, ctx: &BuildContext) -> CompileResult<Expr> {
    let document = Arc::clone(&ctx.document);
    let native = Native::new("delete-entity", Arity::Exact(1), move |args| {
        let Expr::Container(entity) = &args[0] else {
            return Err(type_error("delete-entity", "container", &args[0]));
        };
        document.delete_entity(entity.id)?;
        Ok(Expr::Boolean(true))
    });
    Ok(Expr::call(Expr::Native(native), inputs))
}

fn type_error(context: &str, expected: &'static str, found: &Expr) -> EvalError {
    EvalError::TypeMismatch {
        context: context.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn text_arg<'a>(context: &str, arg: &'a Expr) -> EvalResult<&'a str> {
    match arg {
        Expr::Text(s) => Ok(s),
        other => Err(type_error(context, "text", other)),
    }
}

fn entity_arg(context: &str, arg: &Expr) -> EvalResult<EntityId> {
    match arg {
        // Ids travel as text so the full u64 range survives.
        Expr::Text(s) => s
            .parse()
            .map(EntityId)
            .map_err(|_| type_error(context, "entity id", arg)),
        Expr::Container(entity) => Ok(entity.id),
        other => Err(type_error(context, "entity id", other)),
    }
}

fn resolve(document: &dyn Document, id: EntityId) -> EvalResult<Expr> {
    document
        .resolve(id)
        .map(Expr::Container)
        .ok_or_else(|| EvalError::External {
            message: format!("Entity {} no longer exists", id),
        })
}

/// Convert an evaluated value into something an entity parameter can hold.
pub fn expr_to_param(context: &str, value: &Expr) -> EvalResult<ParamValue> {
    match value {
        Expr::Number(n) => Ok(ParamValue::Number(*n)),
        Expr::Text(s) => Ok(ParamValue::Text(s.clone())),
        Expr::Boolean(b) => Ok(ParamValue::Boolean(*b)),
        Expr::Container(entity) => Ok(ParamValue::Entity(entity.id)),
        other => Err(type_error(context, "number, text, boolean or container", other)),
    }
}

pub fn param_to_expr(document: &dyn Document, value: ParamValue) -> EvalResult<Expr> {
    match value {
        ParamValue::Number(n) => Ok(Expr::Number(n)),
        ParamValue::Text(s) => Ok(Expr::Text(s)),
        ParamValue::Boolean(b) => Ok(Expr::Boolean(b)),
        ParamValue::Entity(id) => resolve(document, id),
    }
}
