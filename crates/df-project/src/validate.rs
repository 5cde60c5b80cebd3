//! Project validation logic.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::schema::{PortKindDef, ProjectFile, WorkspaceDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &ProjectFile) -> Result<(), ValidationError> {
    if project.version != crate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    let mut function_names = HashSet::new();
    for function in &project.functions {
        if function.name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "function name".to_string(),
                value: function.name.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if !function_names.insert(function.name.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: function.name.clone(),
                context: "functions".to_string(),
            });
        }
    }

    // Node ids are unique across every workspace.
    let mut node_ids = HashSet::new();
    validate_workspace(&project.home, "home", &mut node_ids)?;
    for function in &project.functions {
        let context = format!("function '{}'", function.name);
        validate_workspace(&function.workspace, &context, &mut node_ids)?;
    }

    Ok(())
}

fn validate_workspace(
    ws: &WorkspaceDef,
    context: &str,
    all_ids: &mut HashSet<Uuid>,
) -> Result<(), ValidationError> {
    let mut local = HashSet::new();
    for node in &ws.nodes {
        if !all_ids.insert(node.id) {
            return Err(ValidationError::DuplicateId {
                id: node.id.to_string(),
                context: format!("{} nodes", context),
            });
        }
        local.insert(node.id);
    }

    let mut destinations: HashMap<(Uuid, usize), Uuid> = HashMap::new();
    for connector in &ws.connectors {
        for endpoint in [connector.start, connector.end] {
            if !local.contains(&endpoint) {
                return Err(ValidationError::MissingReference {
                    id: endpoint.to_string(),
                    context: format!("{} connectors", context),
                });
            }
        }
        if connector.start_index != 0 {
            return Err(ValidationError::InvalidValue {
                field: "start_index".to_string(),
                value: connector.start_index.to_string(),
                reason: "nodes have a single output".to_string(),
            });
        }
        if connector.port_kind != PortKindDef::Input {
            return Err(ValidationError::InvalidValue {
                field: "port_kind".to_string(),
                value: "output".to_string(),
                reason: "connectors end on an input port".to_string(),
            });
        }
        if destinations
            .insert((connector.end, connector.end_index), connector.start)
            .is_some()
        {
            return Err(ValidationError::DuplicateId {
                id: format!("{}[{}]", connector.end, connector.end_index),
                context: format!("{} connector destinations", context),
            });
        }
    }

    Ok(())
}
