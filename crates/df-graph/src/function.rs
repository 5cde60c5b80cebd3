//! User-defined functions.

use crate::graph::{Workspace, WorkspaceId};
use crate::kind::NodeKind;

/// A named, separately editable workspace whose parameters are its Symbol
/// nodes and whose body is its sink.
#[derive(Debug, Clone)]
pub struct FunctionWorkspace {
    pub name: String,
    pub category: String,
    pub description: String,
    pub workspace: Workspace,
}

impl FunctionWorkspace {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            workspace: Workspace::new(WorkspaceId::Function(name.clone())),
            name,
            category: category.into(),
            description: String::new(),
        }
    }

    /// Parameter names, in workspace order.
    pub fn parameters(&self) -> Vec<String> {
        self.workspace
            .nodes()
            .filter_map(|node| match &node.kind {
                NodeKind::Symbol { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.workspace.id = WorkspaceId::Function(self.name.clone());
    }
}

/// Function names must be usable as top-level symbols.
pub fn is_valid_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '?' | '!'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use df_core::NodeId;

    #[test]
    fn parameters_follow_symbol_nodes() {
        let mut f = FunctionWorkspace::new("area", "geometry");
        for name in ["w", "h"] {
            f.workspace
                .add_node(Node::new(NodeId::new(), NodeKind::Symbol { name: name.into() }))
                .unwrap();
        }
        f.workspace
            .add_node(Node::new(NodeId::new(), NodeKind::Multiply))
            .unwrap();
        assert_eq!(f.parameters(), vec!["w".to_string(), "h".to_string()]);
    }

    #[test]
    fn names_must_be_symbols() {
        assert!(is_valid_function_name("area"));
        assert!(is_valid_function_name("wall-height"));
        assert!(!is_valid_function_name(""));
        assert!(!is_valid_function_name("1st"));
        assert!(!is_valid_function_name("a b"));
        assert!(!is_valid_function_name("%1"));
    }
}
