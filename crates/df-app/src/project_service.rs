//! Project loading, saving, validation, and introspection.

use std::path::Path;
use std::sync::Arc;

use df_core::{Document, NodeId};
use df_graph::{find_cycle, GraphEdit, Node, NodeKind, Position, Workspace, WorkspaceId};
use df_project::{
    ConnectorDef, FunctionDef, NodeDef, NodeKindDef, PortKindDef, ProjectFile, WorkspaceDef,
};

use crate::config::RuntimeConfig;
use crate::error::{AppError, AppResult};
use crate::log::LogSink;
use crate::session::Session;

/// Summary of a function for listing.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    pub name: String,
    pub category: String,
    pub description: String,
    pub parameters: Vec<String>,
    pub node_count: usize,
}

/// Load a project file (YAML or JSON by extension) and validate it.
pub fn load_project(path: &Path) -> AppResult<ProjectFile> {
    if !path.exists() {
        return Err(AppError::ProjectFileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    let project = df_project::load(path)?;
    validate_project(&project)?;
    Ok(project)
}

pub fn save_project(path: &Path, project: &ProjectFile) -> AppResult<()> {
    df_project::save(path, project)?;
    Ok(())
}

pub fn validate_project(project: &ProjectFile) -> AppResult<()> {
    df_project::validate_project(project)
        .map_err(|e| AppError::Project(format!("Invalid project: {}", e)))
}

pub fn list_functions(project: &ProjectFile) -> Vec<FunctionSummary> {
    project
        .functions
        .iter()
        .map(|function| FunctionSummary {
            name: function.name.clone(),
            category: function.category.clone(),
            description: function.description.clone(),
            parameters: function
                .workspace
                .nodes
                .iter()
                .filter_map(|node| match &node.kind {
                    NodeKindDef::Symbol { name } => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            node_count: function.workspace.nodes.len(),
        })
        .collect()
}

pub fn kind_from_def(def: &NodeKindDef) -> NodeKind {
    match def.clone() {
        NodeKindDef::Number { value } => NodeKind::Number { value },
        NodeKindDef::Text { value } => NodeKind::Text { value },
        NodeKindDef::Boolean { value } => NodeKind::Boolean { value },
        NodeKindDef::Symbol { name } => NodeKind::Symbol { name },
        NodeKindDef::Function { symbol } => NodeKind::Function { symbol },
        NodeKindDef::Add => NodeKind::Add,
        NodeKindDef::Subtract => NodeKind::Subtract,
        NodeKindDef::Multiply => NodeKind::Multiply,
        NodeKindDef::Divide => NodeKind::Divide,
        NodeKindDef::LessThan => NodeKind::LessThan,
        NodeKindDef::GreaterThan => NodeKind::GreaterThan,
        NodeKindDef::Equal => NodeKind::Equal,
        NodeKindDef::Not => NodeKind::Not,
        NodeKindDef::And => NodeKind::And,
        NodeKindDef::Or => NodeKind::Or,
        NodeKindDef::If => NodeKind::If,
        NodeKindDef::List { count } => NodeKind::List { count },
        NodeKindDef::Concat => NodeKind::Concat,
        NodeKindDef::Watch => NodeKind::Watch,
        NodeKindDef::Selection { entity } => NodeKind::Selection { entity },
        NodeKindDef::MultiSelection { entities } => NodeKind::MultiSelection { entities },
        NodeKindDef::CreateEntity { kind } => NodeKind::CreateEntity { kind },
        NodeKindDef::SetParameter { parameter } => NodeKind::SetParameter { parameter },
        NodeKindDef::GetParameter { parameter } => NodeKind::GetParameter { parameter },
        NodeKindDef::DeleteEntity => NodeKind::DeleteEntity,
    }
}

pub fn kind_to_def(kind: &NodeKind) -> NodeKindDef {
    match kind.clone() {
        NodeKind::Number { value } => NodeKindDef::Number { value },
        NodeKind::Text { value } => NodeKindDef::Text { value },
        NodeKind::Boolean { value } => NodeKindDef::Boolean { value },
        NodeKind::Symbol { name } => NodeKindDef::Symbol { name },
        NodeKind::Function { symbol } => NodeKindDef::Function { symbol },
        NodeKind::Add => NodeKindDef::Add,
        NodeKind::Subtract => NodeKindDef::Subtract,
        NodeKind::Multiply => NodeKindDef::Multiply,
        NodeKind::Divide => NodeKindDef::Divide,
        NodeKind::LessThan => NodeKindDef::LessThan,
        NodeKind::GreaterThan => NodeKindDef::GreaterThan,
        NodeKind::Equal => NodeKindDef::Equal,
        NodeKind::Not => NodeKindDef::Not,
        NodeKind::And => NodeKindDef::And,
        NodeKind::Or => NodeKindDef::Or,
        NodeKind::If => NodeKindDef::If,
        NodeKind::List { count } => NodeKindDef::List { count },
        NodeKind::Concat => NodeKindDef::Concat,
        NodeKind::Watch => NodeKindDef::Watch,
        NodeKind::Selection { entity } => NodeKindDef::Selection { entity },
        NodeKind::MultiSelection { entities } => NodeKindDef::MultiSelection { entities },
        NodeKind::CreateEntity { kind } => NodeKindDef::CreateEntity { kind },
        NodeKind::SetParameter { parameter } => NodeKindDef::SetParameter { parameter },
        NodeKind::GetParameter { parameter } => NodeKindDef::GetParameter { parameter },
        NodeKind::DeleteEntity => NodeKindDef::DeleteEntity,
    }
}

/// Build a session from a validated project.
///
/// Runtime settings come from the project, then environment overrides.
/// Every node starts Dirty. Functions that do not compile yet are left
/// undefined with a warning; the project still loads.
pub fn session_from_project(
    project: &ProjectFile,
    document: Arc<dyn Document>,
    log: Arc<dyn LogSink>,
) -> AppResult<Session> {
    validate_project(project)?;
    let config = RuntimeConfig::from_settings(&project.settings).with_env();
    let mut session = Session::new(document, log, config);

    for function in &project.functions {
        session.apply_edit(GraphEdit::NewFunction {
            name: function.name.clone(),
            category: function.category.clone(),
        })?;
        if let Some(target) = session.graph.function_mut(&function.name) {
            target.description = function.description.clone();
        }
    }

    add_nodes(&mut session, WorkspaceId::Home, &project.home)?;
    for function in &project.functions {
        add_nodes(
            &mut session,
            WorkspaceId::Function(function.name.clone()),
            &function.workspace,
        )?;
    }
    for function in &project.functions {
        session.graph.sync_callers(&function.name)?;
    }

    add_connectors(&mut session, &project.home)?;
    for function in &project.functions {
        add_connectors(&mut session, &function.workspace)?;
    }

    for ws in session.graph.workspaces() {
        if let Some(node) = find_cycle(ws) {
            tracing::warn!(workspace = %ws.id(), %node, "workspace contains a cycle");
        }
    }

    for function in &project.functions {
        if let Err(err) = session.save_function(&function.name) {
            tracing::warn!(function = %function.name, error = %err, "function not defined on load");
        }
    }

    tracing::info!(
        project = %project.name,
        functions = project.functions.len(),
        nodes = session.graph.all_nodes().count(),
        "project loaded"
    );
    Ok(session)
}

fn add_nodes(session: &mut Session, workspace: WorkspaceId, def: &WorkspaceDef) -> AppResult<()> {
    for node in &def.nodes {
        let outcome = session.apply_edit(GraphEdit::AddNode {
            workspace: workspace.clone(),
            id: Some(NodeId::from_uuid(node.id)),
            kind: kind_from_def(&node.kind),
            name: Some(node.name.clone()),
            position: Position::new(node.x, node.y),
        })?;
        for err in outcome.watch_errors {
            tracing::warn!(node = %node.id, error = %err, "selection not restored");
        }
    }
    Ok(())
}

fn add_connectors(session: &mut Session, def: &WorkspaceDef) -> AppResult<()> {
    for connector in &def.connectors {
        session.apply_edit(GraphEdit::AddConnector {
            start: NodeId::from_uuid(connector.start),
            end: NodeId::from_uuid(connector.end),
            end_index: connector.end_index,
        })?;
    }
    Ok(())
}

/// Snapshot a session as a project file.
pub fn project_from_session(session: &Session, name: &str) -> ProjectFile {
    let mut project = ProjectFile::new(name);
    project.home = workspace_def(&session.graph.home);
    project.functions = session
        .graph
        .functions()
        .map(|function| FunctionDef {
            name: function.name.clone(),
            category: function.category.clone(),
            description: function.description.clone(),
            workspace: workspace_def(&function.workspace),
        })
        .collect();
    project.settings = session.config.to_settings();
    project
}

fn workspace_def(ws: &Workspace) -> WorkspaceDef {
    WorkspaceDef {
        x: 0.0,
        y: 0.0,
        nodes: ws.nodes().map(node_def).collect(),
        connectors: ws
            .connectors()
            .map(|c| ConnectorDef {
                start: c.start.as_uuid(),
                start_index: 0,
                end: c.end.as_uuid(),
                end_index: c.end_index,
                port_kind: PortKindDef::Input,
            })
            .collect(),
    }
}

fn node_def(node: &Node) -> NodeDef {
    NodeDef {
        id: node.id.as_uuid(),
        name: node.name.clone(),
        kind: kind_to_def(&node.kind),
        x: node.position.x,
        y: node.position.y,
    }
}

pub fn load_session(
    path: &Path,
    document: Arc<dyn Document>,
    log: Arc<dyn LogSink>,
) -> AppResult<Session> {
    let project = load_project(path)?;
    session_from_project(&project, document, log)
}

pub fn save_session(path: &Path, session: &Session, name: &str) -> AppResult<()> {
    save_project(path, &project_from_session(session, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use df_core::MemoryDocument;
    use uuid::Uuid;

    fn node(id: Uuid, kind: NodeKindDef) -> NodeDef {
        NodeDef {
            id,
            name: String::new(),
            kind,
            x: 0.0,
            y: 0.0,
        }
    }

    fn wire(start: Uuid, end: Uuid, end_index: usize) -> ConnectorDef {
        ConnectorDef {
            start,
            start_index: 0,
            end,
            end_index,
            port_kind: PortKindDef::Input,
        }
    }

    fn increment_project() -> (ProjectFile, Uuid) {
        let (x, one, add) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (five, call) = (Uuid::new_v4(), Uuid::new_v4());
        let mut project = ProjectFile::new("demo");
        project.functions.push(FunctionDef {
            name: "inc".into(),
            category: "math".into(),
            description: "adds one".into(),
            workspace: WorkspaceDef {
                nodes: vec![
                    node(x, NodeKindDef::Symbol { name: "x".into() }),
                    node(one, NodeKindDef::Number { value: 1.0 }),
                    node(add, NodeKindDef::Add),
                ],
                connectors: vec![wire(x, add, 0), wire(one, add, 1)],
                ..WorkspaceDef::default()
            },
        });
        project.home.nodes = vec![
            node(five, NodeKindDef::Number { value: 5.0 }),
            node(call, NodeKindDef::Function { symbol: "inc".into() }),
        ];
        project.home.connectors = vec![wire(five, call, 0)];
        (project, call)
    }

    #[test]
    fn kinds_convert_both_ways() {
        let kinds = [
            NodeKind::List { count: 3 },
            NodeKind::Selection { entity: None },
            NodeKind::CreateEntity {
                kind: "beam".into(),
            },
            NodeKind::DeleteEntity,
        ];
        for kind in kinds {
            assert_eq!(kind_from_def(&kind_to_def(&kind)), kind);
        }
    }

    #[test]
    fn loaded_session_defines_functions_and_wires_callers() {
        let (project, call) = increment_project();
        let session = session_from_project(
            &project,
            Arc::new(MemoryDocument::new()),
            Arc::new(MemoryLog::new()),
        )
        .unwrap();

        assert!(session.env.is_defined("inc"));
        let call = session.graph.node(NodeId::from_uuid(call)).unwrap();
        assert_eq!(call.inputs.len(), 1);
        assert_eq!(call.inputs[0].name, "x");
        assert!(call.is_dirty());
        assert_eq!(session.graph.function("inc").unwrap().description, "adds one");
    }

    #[test]
    fn session_snapshot_matches_the_source_project() {
        let (project, _) = increment_project();
        let session = session_from_project(
            &project,
            Arc::new(MemoryDocument::new()),
            Arc::new(MemoryLog::new()),
        )
        .unwrap();

        let saved = project_from_session(&session, "demo");
        assert_eq!(saved.home.nodes.len(), 2);
        assert_eq!(saved.home.connectors, project.home.connectors);
        assert_eq!(saved.functions[0].workspace.nodes, project.functions[0].workspace.nodes);
        assert_eq!(list_functions(&saved)[0].parameters, vec!["x".to_string()]);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_project(Path::new("/nonexistent/project.yaml")).unwrap_err();
        assert!(matches!(err, AppError::ProjectFileRead { .. }));
    }
}
