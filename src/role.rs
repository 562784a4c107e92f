//! Rol jerárquico de un nodo y las tres codificaciones externas que lo expresan.
//!
//! El backend informa el rol de tres formas independientes que no siempre
//! coinciden entre sí:
//!   - etiqueta `type`: `root` / `branch` / `leaf`,
//!   - banderas `root`, `trunk`, `leaf` (0/1),
//!   - cadena `group`: `root` / `trunk` / `leaf`.
//!
//! Ninguna es autoritativa; la que se aplica en cada punto es configurable.

use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Flag, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Trunk,
    Leaf,
    Other,
}

/// Codificación externa de la que se deriva el rol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScheme {
    TypeTag,
    Flags,
    Group,
}

impl RoleScheme {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "type" | "type_tag" | "tag" => Ok(Self::TypeTag),
            "flags" | "flag" => Ok(Self::Flags),
            "group" => Ok(Self::Group),
            other => Err(anyhow!("Esquema de rol no soportado: {other}")),
        }
    }

    /// Rol del nodo según esta codificación.
    pub fn classify(&self, node: &Node) -> Role {
        match self {
            Self::TypeTag => role_from_type_tag(node.node_type.as_deref()),
            Self::Flags => role_from_flags(node.root, node.trunk, node.leaf),
            Self::Group => role_from_group(node.group.as_deref()),
        }
    }
}

impl fmt::Display for RoleScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TypeTag => "type",
            Self::Flags => "flags",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

/// `type`: `branch` y `trunk` son el mismo rol.
pub fn role_from_type_tag(tag: Option<&str>) -> Role {
    match tag.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("root") => Role::Root,
        Some("branch") | Some("trunk") => Role::Trunk,
        Some("leaf") => Role::Leaf,
        _ => Role::Other,
    }
}

/// Banderas: si hay varias activas gana `root`, después `trunk`, después `leaf`.
pub fn role_from_flags(root: Option<Flag>, trunk: Option<Flag>, leaf: Option<Flag>) -> Role {
    let set = |f: Option<Flag>| f.is_some_and(|f| f.is_set());
    if set(root) {
        Role::Root
    } else if set(trunk) {
        Role::Trunk
    } else if set(leaf) {
        Role::Leaf
    } else {
        Role::Other
    }
}

pub fn role_from_group(group: Option<&str>) -> Role {
    match group.map(|g| g.trim().to_lowercase()).as_deref() {
        Some("root") => Role::Root,
        Some("trunk") | Some("branch") => Role::Trunk,
        Some("leaf") => Role::Leaf,
        _ => Role::Other,
    }
}

/// Filtro de nodos por rol usado por la vista de detalle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    #[default]
    All,
    Roots,
    Trunks,
    Leaves,
}

impl RoleFilter {
    pub fn matches(&self, role: Role) -> bool {
        match self {
            Self::All => true,
            Self::Roots => role == Role::Root,
            Self::Trunks => role == Role::Trunk,
            Self::Leaves => role == Role::Leaf,
        }
    }
}

/// Divergencias entre codificaciones de los nodos que informan ambas.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub compared: usize,
    pub type_vs_flags: usize,
    pub type_vs_group: usize,
    pub flags_vs_group: usize,
}

impl Divergence {
    pub fn is_consistent(&self) -> bool {
        self.type_vs_flags == 0 && self.type_vs_group == 0 && self.flags_vs_group == 0
    }
}

fn has_flags(node: &Node) -> bool {
    node.root.is_some() || node.trunk.is_some() || node.leaf.is_some()
}

/// Compara las tres codificaciones y avisa en el log si no coinciden.
pub fn audit_divergence(nodes: &[Node]) -> Divergence {
    let mut d = Divergence::default();
    for node in nodes {
        let tag = node.node_type.as_ref().map(|_| RoleScheme::TypeTag.classify(node));
        let flags = has_flags(node).then(|| RoleScheme::Flags.classify(node));
        let group = node.group.as_ref().map(|_| RoleScheme::Group.classify(node));

        if tag.is_some() || flags.is_some() || group.is_some() {
            d.compared += 1;
        }
        if matches!((tag, flags), (Some(a), Some(b)) if a != b) {
            d.type_vs_flags += 1;
        }
        if matches!((tag, group), (Some(a), Some(b)) if a != b) {
            d.type_vs_group += 1;
        }
        if matches!((flags, group), (Some(a), Some(b)) if a != b) {
            d.flags_vs_group += 1;
        }
    }

    if !d.is_consistent() {
        warn!(
            "Codificaciones de rol divergentes en {} nodos: type/flags={}, type/group={}, flags/group={}",
            d.compared, d.type_vs_flags, d.type_vs_group, d.flags_vs_group
        );
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn type_tag_maps_branch_to_trunk() {
        assert_eq!(role_from_type_tag(Some("root")), Role::Root);
        assert_eq!(role_from_type_tag(Some("branch")), Role::Trunk);
        assert_eq!(role_from_type_tag(Some("Leaf")), Role::Leaf);
        assert_eq!(role_from_type_tag(Some("concepto")), Role::Other);
        assert_eq!(role_from_type_tag(None), Role::Other);
    }

    #[test]
    fn flags_accept_numbers_and_booleans() {
        let n = node(json!({"id": 1, "root": 0, "trunk": true, "leaf": 1}));
        assert_eq!(RoleScheme::Flags.classify(&n), Role::Trunk);
        let n = node(json!({"id": 2}));
        assert_eq!(RoleScheme::Flags.classify(&n), Role::Other);
    }

    #[test]
    fn scheme_parsing() {
        assert_eq!(RoleScheme::from_str("FLAGS").unwrap(), RoleScheme::Flags);
        assert_eq!(RoleScheme::from_str("type").unwrap(), RoleScheme::TypeTag);
        assert_eq!(RoleScheme::from_str("group").unwrap(), RoleScheme::Group);
        assert!(RoleScheme::from_str("color").is_err());
    }

    #[test]
    fn divergence_is_counted_per_pair() {
        let nodes = vec![
            node(json!({"id": 1, "type": "root", "root": 1, "group": "root"})),
            node(json!({"id": 2, "type": "leaf", "trunk": 1, "group": "leaf"})),
            node(json!({"id": 3, "label": "sin rol"})),
        ];
        let d = audit_divergence(&nodes);
        assert_eq!(d.compared, 2);
        assert_eq!(d.type_vs_flags, 1);
        assert_eq!(d.type_vs_group, 0);
        assert_eq!(d.flags_vs_group, 1);
        assert!(!d.is_consistent());
    }

    #[test]
    fn role_filter_matches() {
        assert!(RoleFilter::All.matches(Role::Other));
        assert!(RoleFilter::Leaves.matches(Role::Leaf));
        assert!(!RoleFilter::Roots.matches(Role::Trunk));
    }
}
