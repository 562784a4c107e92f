//! Modelos de dominio: nodos, árboles y páginas del historial tal y como los
//! devuelve el backend de generación.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Identificador de nodo. El backend lo emite como entero o como texto,
/// y las referencias en `children` pueden usar cualquiera de las dos formas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Text(String),
}

impl NodeId {
    /// Clave canónica para resolver referencias (`2` y `"2"` son el mismo nodo).
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(n) => write!(f, "{n}"),
            NodeId::Text(s) => f.write_str(s),
        }
    }
}

/// Valor escalar bibliográfico (año, PMID...) que puede llegar como número o texto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Bandera 0/1 de las columnas `root`, `trunk` y `leaf`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(n) => *n != 0,
        }
    }

    /// Valor numérico usado en CSV.
    pub fn as_number(&self) -> i64 {
        match self {
            Flag::Bool(b) => i64::from(*b),
            Flag::Int(n) => *n,
        }
    }
}

/// Autores: lista ordenada o una única cadena ya formateada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authors {
    List(Vec<String>),
    Single(String),
}

impl Authors {
    pub fn joined(&self) -> String {
        match self {
            Authors::List(names) => names.join("; "),
            Authors::Single(s) => s.clone(),
        }
    }
}

/// Un nodo de la lista plana de un árbol.
///
/// `children` son referencias débiles: ids que se resuelven contra la misma
/// lista. Los campos tipados son una vista de lectura; el objeto recibido se
/// guarda en `raw` y es lo único que se serializa, así que la exportación
/// JSON reproduce el nodo tal cual (campos desconocidos, `null` y números
/// incluidos).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub node_type: Option<String>,
    pub type_label: Option<String>,
    pub group: Option<String>,
    pub year: Option<Scalar>,
    pub authors: Option<Authors>,
    pub doi: Option<String>,
    pub pmid: Option<Scalar>,
    pub arxiv_id: Option<String>,
    pub url: Option<String>,
    pub root: Option<Flag>,
    pub trunk: Option<Flag>,
    pub leaf: Option<Flag>,
    pub sap: Option<f64>,
    pub times_cited: Option<u64>,
    pub children: Vec<NodeId>,
    pub raw: Map<String, Value>,
}

/// Campos que el pipeline interpreta, leídos del objeto crudo.
#[derive(Deserialize)]
struct NodeFields {
    id: NodeId,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "type", default)]
    node_type: Option<String>,
    #[serde(default)]
    type_label: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    year: Option<Scalar>,
    #[serde(default)]
    authors: Option<Authors>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    pmid: Option<Scalar>,
    #[serde(default)]
    arxiv_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    root: Option<Flag>,
    #[serde(default)]
    trunk: Option<Flag>,
    #[serde(default)]
    leaf: Option<Flag>,
    #[serde(rename = "_sap", default)]
    sap: Option<f64>,
    #[serde(default)]
    times_cited: Option<u64>,
    #[serde(default)]
    children: Option<Vec<NodeId>>,
}

impl TryFrom<Map<String, Value>> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let fields = NodeFields::deserialize(&Value::Object(raw.clone()))?;
        Ok(Self {
            id: fields.id,
            label: fields.label.unwrap_or_default(),
            node_type: fields.node_type,
            type_label: fields.type_label,
            group: fields.group,
            year: fields.year,
            authors: fields.authors,
            doi: fields.doi,
            pmid: fields.pmid,
            arxiv_id: fields.arxiv_id,
            url: fields.url,
            root: fields.root,
            trunk: fields.trunk,
            leaf: fields.leaf,
            sap: fields.sap,
            times_cited: fields.times_cited,
            children: fields.children.unwrap_or_default(),
            raw,
        })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl Node {
    /// Enlace externo del documento: DOI, PubMed, arXiv o URL, por ese orden.
    pub fn external_link(&self) -> Option<String> {
        if let Some(doi) = non_blank(self.doi.as_deref()) {
            return Some(format!("https://doi.org/{doi}"));
        }
        if let Some(pmid) = &self.pmid {
            let pmid = pmid.to_string();
            if !pmid.trim().is_empty() {
                return Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}"));
            }
        }
        if let Some(arxiv) = non_blank(self.arxiv_id.as_deref()) {
            return Some(format!("https://arxiv.org/abs/{arxiv}"));
        }
        non_blank(self.url.as_deref()).map(str::to_string)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Estadísticas que el backend incrusta en `arbol_json` o en el resumen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<u64>,
    #[serde(default, alias = "branches", skip_serializing_if = "Option::is_none")]
    pub trunks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaves: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_sap: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contenido generado del árbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArbolJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<EmbeddedStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArbolJson {
    /// `metadata.generated_at`, si el backend la informó.
    pub fn generated_at(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("generated_at"))
            .and_then(Value::as_str)
    }
}

/// Árbol completo devuelto por el endpoint de detalle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub seed: String,
    #[serde(default)]
    pub bibliography_name: Option<String>,
    #[serde(default)]
    pub fecha_generado: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nodes_count: Option<u64>,
    #[serde(default)]
    pub arbol_json: ArbolJson,
}

impl Tree {
    pub fn display_title(&self) -> String {
        display_title(self.title.as_deref(), self.id)
    }

    /// Nodos del árbol, o `None` si el backend no los incluyó.
    pub fn nodes(&self) -> Option<&[Node]> {
        self.arbol_json.nodes.as_deref()
    }
}

/// Proyección reducida de un árbol devuelta por el listado paginado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub seed: String,
    #[serde(default)]
    pub bibliography_name: Option<String>,
    #[serde(default)]
    pub fecha_generado: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nodes_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<EmbeddedStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbol_json: Option<ArbolJson>,
}

impl TreeSummary {
    /// Resumen mínimo para un árbol del que sólo se conoce el id.
    pub fn bare(id: i64) -> Self {
        Self {
            id,
            title: None,
            seed: String::new(),
            bibliography_name: None,
            fecha_generado: None,
            nodes_count: None,
            statistics: None,
            arbol_json: None,
        }
    }

    pub fn display_title(&self) -> String {
        display_title(self.title.as_deref(), self.id)
    }

    /// Estadísticas a nivel de árbol: las del resumen o, en su defecto, las de `arbol_json`.
    pub fn tree_statistics(&self) -> Option<&EmbeddedStatistics> {
        self.statistics
            .as_ref()
            .or_else(|| self.arbol_json.as_ref().and_then(|a| a.statistics.as_ref()))
    }

    /// Número de nodos: `nodes_count` o la longitud de la lista incrustada.
    pub fn node_total(&self) -> u64 {
        self.nodes_count.unwrap_or_else(|| {
            self.arbol_json
                .as_ref()
                .and_then(|a| a.nodes.as_ref())
                .map(|n| n.len() as u64)
                .unwrap_or(0)
        })
    }

    /// Convierte el resumen en árbol completo si ya trae la lista de nodos.
    pub fn embedded_tree(&self) -> Option<Tree> {
        let arbol_json = self.arbol_json.as_ref()?;
        arbol_json.nodes.as_ref()?;
        Some(Tree {
            id: self.id,
            title: self.title.clone(),
            seed: self.seed.clone(),
            bibliography_name: self.bibliography_name.clone(),
            fecha_generado: self.fecha_generado,
            nodes_count: self.nodes_count,
            arbol_json: arbol_json.clone(),
        })
    }
}

/// Título visible: el título si no está vacío, o `Tree {id}`.
pub fn display_title(title: Option<&str>, id: i64) -> String {
    match non_blank(title) {
        Some(t) => t.to_string(),
        None => format!("Tree {id}"),
    }
}

/// Respuesta del listado paginado.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreePage {
    pub count: u64,
    pub results: Vec<TreeSummary>,
}

/// Clave de una petición de listado. Dos respuestas son intercambiables
/// sólo si sus claves coinciden.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
}

/// Resumen de la página visible del historial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageOverview {
    pub total: u64,
    pub this_month: usize,
    pub with_bibliography: usize,
}

impl PageOverview {
    pub fn from_page(page: &TreePage, now: DateTime<Utc>) -> Self {
        let this_month = page
            .results
            .iter()
            .filter_map(|t| t.fecha_generado)
            .filter(|d| d.year() == now.year() && d.month() == now.month())
            .count();
        let with_bibliography = page
            .results
            .iter()
            .filter(|t| non_blank(t.bibliography_name.as_deref()).is_some())
            .count();
        Self {
            total: page.count,
            this_month,
            with_bibliography,
        }
    }
}
