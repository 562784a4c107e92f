//! Taxonomía de errores del pipeline de exportación y del listado.

use thiserror::Error;

use crate::models::NodeId;

/// Resultado no exitoso de una llamada al backend de árboles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("recurso no encontrado: {0}")]
    NotFound(String),

    #[error("fallo en la llamada al backend: {0}")]
    Failed(String),
}

/// La reconstrucción de la jerarquía volvió a visitar un nodo de su propia rama.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("referencia cíclica en children: el nodo {node_id} se visita dos veces en la misma rama")]
pub struct CyclicReferenceError {
    pub node_id: NodeId,
}

/// Motivos por los que la jerarquía no se pudo reconstruir.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error(transparent)]
    Cyclic(#[from] CyclicReferenceError),

    #[error("la jerarquía supera {limit} niveles de profundidad en el nodo {node_id}")]
    TooDeep { node_id: NodeId, limit: usize },
}

#[derive(Debug, Error)]
pub enum ExportError {
    /// Condición recuperable: no se genera un fichero vacío.
    #[error("nada que exportar: {0}")]
    NothingToExport(&'static str),

    #[error("No se pudieron cargar los datos del árbol {id}: {source}")]
    DetailUnavailable {
        id: i64,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Hierarchy(#[from] ReconstructError),

    #[error("error de codificación: {0}")]
    Encoding(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("la eliminación del árbol {0} requiere confirmación")]
    NotConfirmed(i64),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
