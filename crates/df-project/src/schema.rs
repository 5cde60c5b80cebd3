//! Project schema definitions.

use df_core::EntityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub home: WorkspaceDef,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub settings: SettingsDef,
}

impl ProjectFile {
    /// An empty project at the current schema version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: crate::LATEST_VERSION,
            name: name.into(),
            home: WorkspaceDef::default(),
            functions: Vec::new(),
            settings: SettingsDef::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceDef {
    /// Canvas offset.
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub connectors: Vec<ConnectorDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub id: Uuid,
    pub name: String,
    pub kind: NodeKindDef,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Node kind and its saved state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeKindDef {
    Number {
        value: f64,
    },
    Text {
        value: String,
    },
    Boolean {
        value: bool,
    },
    Symbol {
        name: String,
    },
    Function {
        symbol: String,
    },
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
    List {
        count: usize,
    },
    Concat,
    Watch,
    Selection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<EntityId>,
    },
    MultiSelection {
        #[serde(default)]
        entities: Vec<EntityId>,
    },
    CreateEntity {
        kind: String,
    },
    SetParameter {
        parameter: String,
    },
    GetParameter {
        parameter: String,
    },
    DeleteEntity,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortKindDef {
    #[default]
    Input,
    Output,
}

/// A connector from `start`'s output to input `end_index` of `end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorDef {
    pub start: Uuid,
    #[serde(default)]
    pub start_index: usize,
    pub end: Uuid,
    pub end_index: usize,
    /// Kind of the destination port.
    #[serde(default)]
    pub port_kind: PortKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub workspace: WorkspaceDef,
}

/// Per-project runtime settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsDef {
    #[serde(default)]
    pub dynamic_run: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_name: Option<String>,
}
