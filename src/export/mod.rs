//! Pipeline de exportación: datos del árbol -> codificador -> descarga.
//!
//! API pública:
//!   - `export_tree(backend, summary, format, scheme, today)`
//!   - `export_consolidated(selected, today)`

pub mod csv;
pub mod filename;
pub mod json;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::info;

use crate::{
    backend::TreeBackend,
    detail::ensure_nodes,
    download::Download,
    error::ExportError,
    models::TreeSummary,
    role::RoleScheme,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            other => Err(anyhow!("Formato no soportado: {other}. Use: json, csv, pdf")),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }
}

/// Exporta un árbol en el formato pedido.
///
/// JSON y CSV necesitan los nodos y pasan por la recuperación del detalle;
/// el PDF lo genera el backend y se reenvía tal cual.
pub async fn export_tree(
    backend: &dyn TreeBackend,
    summary: &TreeSummary,
    format: ExportFormat,
    scheme: RoleScheme,
    today: NaiveDate,
) -> Result<Download, ExportError> {
    let download = match format {
        ExportFormat::Pdf => {
            let bytes = backend.download_pdf(summary.id).await?;
            let name = filename::tree_filename(summary.title.as_deref(), today, format.extension());
            Download::pdf(name, bytes)
        }
        ExportFormat::Json | ExportFormat::Csv => {
            let tree = ensure_nodes(backend, summary).await?;
            let nodes = tree.nodes().unwrap_or_default();
            // El título del detalle manda si el resumen no lo tenía.
            let title = tree.title.as_deref().or(summary.title.as_deref());
            let name = filename::tree_filename(title, today, format.extension());
            if format == ExportFormat::Json {
                Download::json(name, json::encode_tree(&tree, nodes, scheme)?)
            } else {
                Download::csv(name, csv::encode_tree(nodes)?)
            }
        }
    };

    info!(
        "Árbol {} exportado como {} ({} bytes)",
        summary.id,
        download.filename,
        download.bytes.len()
    );
    Ok(download)
}

/// CSV consolidado de los árboles seleccionados. No necesita nodos.
pub fn export_consolidated(
    selected: &[TreeSummary],
    today: NaiveDate,
) -> Result<Download, ExportError> {
    let bytes = csv::encode_consolidated(selected)?;
    let download = Download::csv(filename::consolidated_filename(today), bytes);
    info!(
        "Exportación consolidada de {} árboles ({} bytes)",
        selected.len(),
        download.bytes.len()
    );
    Ok(download)
}
