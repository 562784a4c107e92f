//! Codificadores CSV: uno por nodo de un árbol y uno consolidado por árbol.
//!
//! Las filas se separan con `\n` y todas las columnas pasan por la misma
//! regla de escapado, incluidas las numéricas.

use crate::{
    error::ExportError,
    models::{EmbeddedStatistics, Flag, Node, TreeSummary},
};

pub const TREE_HEADERS: [&str; 15] = [
    "ID", "Título", "Tipo", "Grupo", "Año", "Autores", "DOI", "PMID", "arXiv", "URL", "Raíz",
    "Tronco", "Hoja", "SAP", "Citas",
];

pub const CONSOLIDATED_HEADERS: [&str; 9] = [
    "ID",
    "Título",
    "Semilla",
    "Bibliografía",
    "Fecha",
    "Nodos",
    "Raíces",
    "Troncos",
    "Hojas",
];

const LABEL_MAX_CHARS: usize = 100;

/// Entre comillas si contiene coma, comilla doble o salto de línea; las comillas se duplican.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<I, S>(out: &mut String, cells: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if !out.is_empty() {
        out.push('\n');
    }
    let row: Vec<String> = cells.into_iter().map(|c| escape_field(c.as_ref())).collect();
    out.push_str(&row.join(","));
}

fn flag(value: Option<Flag>) -> String {
    value.map(|f| f.as_number()).unwrap_or(0).to_string()
}

fn opt<T: ToString>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

fn node_row(node: &Node) -> [String; 15] {
    [
        node.id.to_string(),
        node.label.chars().take(LABEL_MAX_CHARS).collect(),
        opt(node.type_label.as_ref()),
        opt(node.group.as_ref()),
        opt(node.year.as_ref()),
        node.authors.as_ref().map(|a| a.joined()).unwrap_or_default(),
        opt(node.doi.as_ref()),
        opt(node.pmid.as_ref()),
        opt(node.arxiv_id.as_ref()),
        opt(node.url.as_ref()),
        flag(node.root),
        flag(node.trunk),
        flag(node.leaf),
        node.sap.unwrap_or(0.0).to_string(),
        node.times_cited.unwrap_or(0).to_string(),
    ]
}

/// CSV de un árbol: cabecera y una fila por nodo.
pub fn encode_tree(nodes: &[Node]) -> Result<Vec<u8>, ExportError> {
    if nodes.is_empty() {
        return Err(ExportError::NothingToExport("el árbol no tiene nodos"));
    }
    let mut out = String::new();
    push_row(&mut out, TREE_HEADERS);
    for node in nodes {
        push_row(&mut out, node_row(node));
    }
    Ok(out.into_bytes())
}

/// CSV consolidado: una fila por árbol seleccionado, con los conteos que
/// trae el propio resumen (0 si faltan).
pub fn encode_consolidated(trees: &[TreeSummary]) -> Result<Vec<u8>, ExportError> {
    if trees.is_empty() {
        return Err(ExportError::NothingToExport("no hay árboles seleccionados"));
    }
    let mut out = String::new();
    push_row(&mut out, CONSOLIDATED_HEADERS);
    for tree in trees {
        let stats = tree.tree_statistics();
        let count = |pick: fn(&EmbeddedStatistics) -> Option<u64>| {
            stats.and_then(pick).unwrap_or(0).to_string()
        };
        push_row(
            &mut out,
            [
                tree.id.to_string(),
                tree.display_title(),
                tree.seed.clone(),
                tree.bibliography_name.clone().unwrap_or_default(),
                tree.fecha_generado
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
                tree.node_total().to_string(),
                count(|s| s.roots),
                count(|s| s.trunks),
                count(|s| s.leaves),
            ],
        );
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn escaping_quotes_commas_and_newlines() {
        assert_eq!(escape_field("A, \"B\"\nC"), "\"A, \"\"B\"\"\nC\"");
        assert_eq!(escape_field("simple"), "simple");
        assert_eq!(escape_field("1.5"), "1.5");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn label_field_is_escaped_in_output() {
        let csv = text(encode_tree(&[node(json!({"id": 1, "label": "A, \"B\"\nC"}))]).unwrap());
        let body = csv.split_once('\n').unwrap().1;
        assert!(body.starts_with("1,\"A, \"\"B\"\"\nC\","));
    }

    #[test]
    fn header_and_defaults() {
        let csv = text(encode_tree(&[node(json!({"id": 7, "label": "Nodo"}))]).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "ID,Título,Tipo,Grupo,Año,Autores,DOI,PMID,arXiv,URL,Raíz,Tronco,Hoja,SAP,Citas"
        );
        assert_eq!(lines[1], "7,Nodo,,,,,,,,,0,0,0,0,0");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn full_row() {
        let n = node(json!({
            "id": "n1",
            "label": "Deep learning",
            "type_label": "Hoja",
            "group": "leaf",
            "year": 2015,
            "authors": ["LeCun, Y.", "Bengio, Y."],
            "doi": "10.1038/nature14539",
            "pmid": 26017442,
            "arxiv_id": "1234.5678",
            "url": "https://x.org/a",
            "root": 0, "trunk": 0, "leaf": true,
            "_sap": 3.25,
            "times_cited": 120
        }));
        let csv = text(encode_tree(&[n]).unwrap());
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "n1,Deep learning,Hoja,leaf,2015,\"LeCun, Y.; Bengio, Y.\",10.1038/nature14539,26017442,1234.5678,https://x.org/a,0,0,1,3.25,120"
        );
    }

    #[test]
    fn long_labels_are_truncated_by_characters() {
        let label: String = "é".repeat(150);
        let csv = text(encode_tree(&[node(json!({"id": 1, "label": label}))]).unwrap());
        let row = csv.lines().nth(1).unwrap();
        let field = row.split(',').nth(1).unwrap();
        assert_eq!(field.chars().count(), 100);
    }

    #[test]
    fn empty_tree_is_nothing_to_export() {
        assert!(matches!(encode_tree(&[]), Err(ExportError::NothingToExport(_))));
    }

    #[test]
    fn encoding_is_deterministic() {
        let nodes = vec![
            node(json!({"id": 1, "label": "a,b", "_sap": 0.1})),
            node(json!({"id": 2, "label": "c"})),
        ];
        assert_eq!(encode_tree(&nodes).unwrap(), encode_tree(&nodes).unwrap());
    }

    #[test]
    fn consolidated_uses_tree_level_statistics() {
        let mut a = TreeSummary::bare(3);
        a.title = Some("Árbol, tres".into());
        a.seed = "redes".into();
        a.nodes_count = Some(12);
        a.statistics = Some(EmbeddedStatistics {
            roots: Some(2),
            trunks: Some(4),
            leaves: Some(6),
            ..Default::default()
        });
        let b = TreeSummary::bare(7);

        let csv = text(encode_consolidated(&[a, b]).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "ID,Título,Semilla,Bibliografía,Fecha,Nodos,Raíces,Troncos,Hojas");
        assert_eq!(lines[1], "3,\"Árbol, tres\",redes,,,12,2,4,6");
        assert_eq!(lines[2], "7,Tree 7,,,,0,0,0,0");
    }

    #[test]
    fn consolidated_without_selection_is_nothing_to_export() {
        assert!(matches!(
            encode_consolidated(&[]),
            Err(ExportError::NothingToExport(_))
        ));
    }
}
