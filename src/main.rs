// Módulos del servicio de exportación
mod api;
mod app_state;
mod backend;
mod config;
mod detail;
mod download;
mod error;
mod export;
mod hierarchy;
mod list;
mod models;
mod role;
mod stats;

use crate::app_state::{AppState, Status};
use crate::backend::HttpBackend;
use crate::list::ListController;
use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Entorno y logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Roles: estadísticas por '{}', jerarquía por '{}', filtro por '{}'",
        cfg.stats_scheme, cfg.hierarchy_scheme, cfg.filter_scheme
    );

    // 3. Cliente del backend de árboles
    let backend = HttpBackend::from_config(&cfg);

    // Canal de apagado compartido con el handler de shutdown.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        backend: Arc::new(backend),
        list: Arc::new(Mutex::new(ListController::new(
            cfg.page_size,
            cfg.search_debounce,
        ))),
        status: Arc::new(Mutex::new(Status {
            is_error: false,
            message: "Servicio de exportación listo.".to_string(),
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 5. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Apagado ordenado al recibir POST /api/shutdown.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Apagado solicitado; cerrando el servidor de exportación.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor de exportación detenido.");
    Ok(())
}
