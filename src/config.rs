//! Carga y gestión de configuración de la aplicación (backend de árboles + servidor local).

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::{list::DEFAULT_SEARCH_DEBOUNCE, role::RoleScheme};

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend_url: Url,
    pub backend_token: Option<String>,
    pub server_addr: String,

    pub page_size: u32,
    pub search_debounce: Duration,

    /// Codificación de rol usada para contar raíces, troncos y hojas.
    pub stats_scheme: RoleScheme,
    /// Codificación de rol usada para elegir la raíz de la jerarquía.
    pub hierarchy_scheme: RoleScheme,
    /// Codificación de rol usada por el filtro de nodos de la vista de detalle.
    pub filter_scheme: RoleScheme,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let backend_url_str =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8000/api/".to_string());
        let backend_url = parse_backend_url(&backend_url_str)?;

        let backend_token = env::var("BACKEND_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let page_size = match env::var("PAGE_SIZE") {
            Ok(raw) => parse_page_size(&raw)?,
            Err(_) => 10,
        };

        let search_debounce = match env::var("SEARCH_DEBOUNCE_MS") {
            Ok(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("SEARCH_DEBOUNCE_MS no es un número válido: {raw}"))?,
            ),
            Err(_) => DEFAULT_SEARCH_DEBOUNCE,
        };

        let stats_scheme_str =
            env::var("STATS_ROLE_SCHEME").unwrap_or_else(|_| "flags".to_string());
        let stats_scheme = RoleScheme::from_str(&stats_scheme_str)?;

        let hierarchy_scheme_str =
            env::var("HIERARCHY_ROLE_SCHEME").unwrap_or_else(|_| "type".to_string());
        let hierarchy_scheme = RoleScheme::from_str(&hierarchy_scheme_str)?;

        let filter_scheme_str =
            env::var("FILTER_ROLE_SCHEME").unwrap_or_else(|_| "group".to_string());
        let filter_scheme = RoleScheme::from_str(&filter_scheme_str)?;

        Ok(Self {
            backend_url,
            backend_token,
            server_addr,
            page_size,
            search_debounce,
            stats_scheme,
            hierarchy_scheme,
            filter_scheme,
        })
    }
}

/// La URL base debe terminar en '/' para que `Url::join` conserve el prefijo `/api/`.
fn parse_backend_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).with_context(|| format!("BACKEND_URL no es una URL válida: {raw}"))
}

fn parse_page_size(raw: &str) -> Result<u32> {
    let size: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("PAGE_SIZE no es un número válido: {raw}"))?;
    if size == 0 {
        return Err(anyhow!("PAGE_SIZE debe ser mayor que cero"));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_url_gets_trailing_slash() {
        let url = parse_backend_url("http://localhost:8000/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/");
        assert_eq!(
            url.join("trees/").unwrap().as_str(),
            "http://localhost:8000/api/trees/"
        );
    }

    #[test]
    fn backend_url_rejects_garbage() {
        assert!(parse_backend_url("no es una url").is_err());
    }

    #[test]
    fn page_size_must_be_positive() {
        assert_eq!(parse_page_size(" 25 ").unwrap(), 25);
        assert!(parse_page_size("0").is_err());
        assert!(parse_page_size("diez").is_err());
    }
}
