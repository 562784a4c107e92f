//! Nombres de los ficheros descargados.

use chrono::NaiveDate;

/// Título en minúsculas con todo carácter fuera de `[a-z0-9]` sustituido por `_`.
/// Sin título se usa `tree`.
pub fn slug(title: Option<&str>) -> String {
    match title.filter(|t| !t.trim().is_empty()) {
        Some(t) => t
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
            .collect(),
        None => "tree".to_string(),
    }
}

/// `arbol-{slug}-{YYYY-MM-DD}.{ext}`
pub fn tree_filename(title: Option<&str>, date: NaiveDate, extension: &str) -> String {
    format!("arbol-{}-{}.{extension}", slug(title), date.format("%Y-%m-%d"))
}

/// `arboles-consolidado-{YYYY-MM-DD}.csv`
pub fn consolidated_filename(date: NaiveDate) -> String {
    format!("arboles-consolidado-{}.csv", date.format("%Y-%m-%d"))
}
