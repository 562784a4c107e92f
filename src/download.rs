//! Convierte un contenido codificado y su nombre de fichero en una descarga
//! del navegador (respuesta HTTP con `Content-Disposition: attachment`).

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn json(filename: String, bytes: Vec<u8>) -> Self {
        Self {
            filename,
            content_type: "application/json",
            bytes,
        }
    }

    pub fn csv(filename: String, bytes: Vec<u8>) -> Self {
        Self {
            filename,
            content_type: "text/csv; charset=utf-8",
            bytes,
        }
    }

    pub fn pdf(filename: String, bytes: Vec<u8>) -> Self {
        Self {
            filename,
            content_type: "application/pdf",
            bytes,
        }
    }

    pub fn content_disposition(&self) -> String {
        // Los nombres salen de `slug`, así que no llevan comillas.
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

impl IntoResponse for Download {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&self.content_disposition())
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(self.content_type)),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn response_is_an_attachment() {
        let download = Download::csv("arbol-x-2024-01-01.csv".into(), b"ID\n1".to_vec());
        let response = download.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"arbol-x-2024-01-01.csv\""
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
    }
}
