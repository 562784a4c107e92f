//! Estadísticas de un árbol calculadas sobre la lista plana de nodos.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    models::{EmbeddedStatistics, Node},
    role::{audit_divergence, Role, RoleScheme},
};

/// Conteos por rol y agregados de `_sap`.
///
/// Los nodos sin `_sap` no entran en la media, el máximo ni el mínimo. Si
/// ningún nodo lo define, los tres valen 0 y `sap_available` es `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeStatistics {
    pub roots: u64,
    pub trunks: u64,
    pub leaves: u64,
    pub others: u64,
    pub total: u64,
    pub average_sap: f64,
    pub max_sap: f64,
    pub min_sap: f64,
    pub sap_available: bool,
}

impl TreeStatistics {
    pub fn compute(nodes: &[Node], scheme: RoleScheme) -> Self {
        audit_divergence(nodes);

        let mut stats = Self {
            total: nodes.len() as u64,
            ..Self::default()
        };
        for node in nodes {
            match scheme.classify(node) {
                Role::Root => stats.roots += 1,
                Role::Trunk => stats.trunks += 1,
                Role::Leaf => stats.leaves += 1,
                Role::Other => stats.others += 1,
            }
        }

        let saps: Vec<f64> = nodes.iter().filter_map(|n| n.sap).collect();
        if !saps.is_empty() {
            stats.sap_available = true;
            stats.average_sap = saps.iter().sum::<f64>() / saps.len() as f64;
            stats.max_sap = saps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats.min_sap = saps.iter().copied().fold(f64::INFINITY, f64::min);
        }
        stats
    }

    /// Compara con las estadísticas que trae el backend y avisa si los conteos difieren.
    pub fn check_against(&self, embedded: &EmbeddedStatistics, tree_id: i64) -> bool {
        let mismatches: Vec<String> = [
            ("roots", embedded.roots, self.roots),
            ("trunks", embedded.trunks, self.trunks),
            ("leaves", embedded.leaves, self.leaves),
            ("total", embedded.total, self.total),
        ]
        .into_iter()
        .filter_map(|(name, theirs, ours)| match theirs {
            Some(v) if v != ours => Some(format!("{name}: backend={v} calculado={ours}")),
            _ => None,
        })
        .collect();

        if mismatches.is_empty() {
            return true;
        }
        warn!(
            "Las estadísticas del árbol {tree_id} no coinciden con sus nodos ({})",
            mismatches.join(", ")
        );
        false
    }
}
