//! Exportación JSON canónica: todos los nodos tal cual y las estadísticas
//! recalculadas a partir de ellos.

use serde::{Deserialize, Serialize};

use crate::{
    error::ExportError,
    models::{Node, Tree},
    role::RoleScheme,
    stats::TreeStatistics,
};

/// Documento exportado. `total_nodes` siempre es `nodes.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExport {
    pub title: Option<String>,
    pub seed: String,
    pub bibliography_name: Option<String>,
    pub statistics: TreeStatistics,
    pub generated_at: Option<String>,
    pub total_nodes: usize,
    pub nodes: Vec<Node>,
}

impl JsonExport {
    pub fn build(tree: &Tree, nodes: &[Node], scheme: RoleScheme) -> Self {
        let statistics = TreeStatistics::compute(nodes, scheme);
        if let Some(embedded) = &tree.arbol_json.statistics {
            statistics.check_against(embedded, tree.id);
        }
        let generated_at = tree
            .arbol_json
            .generated_at()
            .map(str::to_string)
            .or_else(|| tree.fecha_generado.map(|d| d.to_rfc3339()));

        Self {
            title: tree.title.clone(),
            seed: tree.seed.clone(),
            bibliography_name: tree.bibliography_name.clone(),
            statistics,
            generated_at,
            total_nodes: nodes.len(),
            nodes: nodes.to_vec(),
        }
    }
}

/// Serializa con sangría de dos espacios. Ante un error no se devuelve nada parcial.
pub fn encode_tree(tree: &Tree, nodes: &[Node], scheme: RoleScheme) -> Result<Vec<u8>, ExportError> {
    if nodes.is_empty() {
        return Err(ExportError::NothingToExport("el árbol no tiene nodos"));
    }
    let document = JsonExport::build(tree, nodes, scheme);
    serde_json::to_vec_pretty(&document).map_err(|e| ExportError::Encoding(e.to_string()))
}
