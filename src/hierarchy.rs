//! Reconstrucción de la jerarquía a partir de la lista plana de nodos.
//!
//! Los nodos viven en la lista plana (arena) y `children` son ids que se
//! resuelven por búsqueda. Un id sin nodo es una referencia muerta y se
//! descarta sin error.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::{
    error::{CyclicReferenceError, ReconstructError},
    models::{Node, NodeId},
    role::{Role, RoleScheme},
};

/// Nodo de la jerarquía reconstruida, listo para serializar hacia el frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub label: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Número de nodos del subárbol, incluido éste.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Índice id -> posición en la lista plana. Con ids duplicados gana el primero.
fn index_by_id(nodes: &[Node]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (pos, node) in nodes.iter().enumerate() {
        index.entry(node.id.key()).or_insert(pos);
    }
    index
}

/// Profundidad máxima de la jerarquía reconstruida. La respuesta HTTP se
/// serializa recursivamente, así que una cadena más larga se rechaza.
pub const MAX_DEPTH: usize = 512;

/// Construye la jerarquía desde el primer nodo cuyo rol, según `root_scheme`,
/// sea `Root`.
///
/// Devuelve `Ok(None)` si no hay raíz (lista vacía incluida). Un nodo que
/// reaparece en su propia rama aborta con `ReconstructError::Cyclic`; un nodo
/// compartido por dos padres sólo se coloca bajo el primero. El recorrido usa
/// una pila explícita: la profundidad no consume pila del hilo.
pub fn reconstruct(
    nodes: &[Node],
    root_scheme: RoleScheme,
) -> Result<Option<HierarchyNode>, ReconstructError> {
    let Some(root) = nodes
        .iter()
        .position(|n| root_scheme.classify(n) == Role::Root)
    else {
        return Ok(None);
    };

    let index = index_by_id(nodes);
    let mut on_path: HashSet<usize> = HashSet::from([root]);
    let mut placed: HashSet<usize> = HashSet::from([root]);
    let mut stack = vec![Frame::new(root)];

    while let Some(frame) = stack.last_mut() {
        let node = &nodes[frame.pos];
        let Some(child_id) = node.children.get(frame.next_child) else {
            // Todos los hijos resueltos: se cierra el nodo y se cuelga del padre.
            let Some(frame) = stack.pop() else { break };
            on_path.remove(&frame.pos);
            let built = HierarchyNode {
                id: node.id.clone(),
                label: node.label.clone(),
                role: root_scheme.classify(node),
                link: node.external_link(),
                children: frame.children,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(built),
                None => return Ok(Some(built)),
            }
            continue;
        };
        frame.next_child += 1;

        let Some(&child) = index.get(&child_id.key()) else {
            debug!("Referencia muerta: el nodo {} apunta a {child_id}", node.id);
            continue;
        };
        if on_path.contains(&child) {
            return Err(CyclicReferenceError {
                node_id: nodes[child].id.clone(),
            }
            .into());
        }
        if !placed.insert(child) {
            continue;
        }
        if stack.len() >= MAX_DEPTH {
            return Err(ReconstructError::TooDeep {
                node_id: nodes[child].id.clone(),
                limit: MAX_DEPTH,
            });
        }
        on_path.insert(child);
        stack.push(Frame::new(child));
    }
    Ok(None)
}

/// Nodo abierto del recorrido: su posición, el próximo hijo a resolver y los
/// hijos ya construidos.
struct Frame {
    pos: usize,
    next_child: usize,
    children: Vec<HierarchyNode>,
}

impl Frame {
    fn new(pos: usize) -> Self {
        Self {
            pos,
            next_child: 0,
            children: Vec::new(),
        }
    }
}
