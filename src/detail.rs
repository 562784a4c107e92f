//! Garantiza que un árbol tenga su lista de nodos antes de exportarlo o
//! reconstruirlo, pidiendo el detalle al backend si el resumen no la trae.

use tracing::{error, info};

use crate::{
    backend::TreeBackend,
    error::{BackendError, ExportError},
    models::{Tree, TreeSummary},
};

/// Árbol con sus nodos garantizados.
pub async fn ensure_nodes(
    backend: &dyn TreeBackend,
    summary: &TreeSummary,
) -> Result<Tree, ExportError> {
    if let Some(tree) = summary.embedded_tree() {
        return Ok(tree);
    }

    info!("El árbol {} no trae nodos; solicitando el detalle", summary.id);
    let tree = backend.get_tree(summary.id).await.map_err(|source| {
        error!("No se pudo cargar el detalle del árbol {}: {source}", summary.id);
        ExportError::DetailUnavailable {
            id: summary.id,
            source,
        }
    })?;

    if tree.nodes().is_none() {
        error!("El detalle del árbol {} llegó sin nodos", summary.id);
        return Err(ExportError::DetailUnavailable {
            id: summary.id,
            source: BackendError::Failed("respuesta sin arbol_json.nodes".into()),
        });
    }
    Ok(tree)
}
