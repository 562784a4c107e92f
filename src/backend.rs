//! Acceso al backend externo que genera y almacena los árboles.
//!
//! API consumida:
//!   - `GET    trees/?page&page_size&search`
//!   - `GET    trees/{id}/`
//!   - `DELETE trees/{id}/`
//!   - `GET    trees/{id}/download/?format=pdf`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{error, info};
use url::Url;

use crate::{
    config::AppConfig,
    error::BackendError,
    models::{ListQuery, Tree, TreePage},
};

#[async_trait]
pub trait TreeBackend: Send + Sync {
    async fn list_trees(&self, query: &ListQuery) -> Result<TreePage, BackendError>;
    async fn get_tree(&self, id: i64) -> Result<Tree, BackendError>;
    async fn delete_tree(&self, id: i64) -> Result<(), BackendError>;
    async fn download_pdf(&self, id: i64) -> Result<Vec<u8>, BackendError>;
}

/// Cliente HTTP del backend. Reintentos y timeouts quedan en manos de `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn from_config(cfg: &AppConfig) -> Self {
        info!("Backend de árboles en {}", cfg.backend_url);
        Self {
            client: Client::new(),
            base_url: cfg.backend_url.clone(),
            token: cfg.backend_token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Failed(format!("URL inválida para '{path}': {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn list_request(&self, query: &ListQuery) -> Result<RequestBuilder, BackendError> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(search) = &query.search {
            params.push(("search", search.clone()));
        }
        Ok(self.client.get(self.endpoint("trees/")?).query(&params))
    }

    fn pdf_request(&self, id: i64) -> Result<RequestBuilder, BackendError> {
        let url = self.endpoint(&format!("trees/{id}/download/"))?;
        Ok(self.client.get(url).query(&[("format", "pdf")]))
    }

    /// Envía la petición y traduce el resultado a éxito / no encontrado / fallo.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, BackendError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            error!("Error de red al {what}: {e}");
            BackendError::Failed(e.to_string())
        })?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(what.to_string())),
            s => {
                error!("El backend respondió {s} al {what}");
                Err(BackendError::Failed(format!("HTTP {s}")))
            }
        }
    }
}

fn decode_error(what: &str, e: reqwest::Error) -> BackendError {
    error!("Respuesta ilegible al {what}: {e}");
    BackendError::Failed(e.to_string())
}

#[async_trait]
impl TreeBackend for HttpBackend {
    async fn list_trees(&self, query: &ListQuery) -> Result<TreePage, BackendError> {
        let what = format!("listar la página {}", query.page);
        let response = self.send(self.list_request(query)?, &what).await?;
        response.json().await.map_err(|e| decode_error(&what, e))
    }

    async fn get_tree(&self, id: i64) -> Result<Tree, BackendError> {
        let url = self.endpoint(&format!("trees/{id}/"))?;
        let what = format!("obtener el árbol {id}");
        let response = self.send(self.client.get(url), &what).await?;
        response.json().await.map_err(|e| decode_error(&what, e))
    }

    async fn delete_tree(&self, id: i64) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("trees/{id}/"))?;
        self.send(self.client.delete(url), &format!("eliminar el árbol {id}"))
            .await?;
        Ok(())
    }

    async fn download_pdf(&self, id: i64) -> Result<Vec<u8>, BackendError> {
        let what = format!("descargar el PDF del árbol {id}");
        let response = self.send(self.pdf_request(id)?, &what).await?;
        let bytes = response.bytes().await.map_err(|e| decode_error(&what, e))?;
        Ok(bytes.to_vec())
    }
}
