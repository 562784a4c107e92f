use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    app_state::{AppState, Status},
    detail::ensure_nodes,
    download::Download,
    error::{BackendError, ExportError, ListError},
    export::{self, ExportFormat},
    hierarchy::{self, HierarchyNode},
    list::{self, ListView},
    models::{Node, PageOverview, Tree, TreeSummary},
    role::{Role, RoleFilter},
    stats::TreeStatistics,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct InputPayload {
    text: String,
}

#[derive(Deserialize)]
pub struct PagePayload {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Deserialize)]
pub struct SelectionPayload {
    id: i64,
}

#[derive(Deserialize)]
pub struct NodesParams {
    #[serde(default)]
    role: RoleFilter,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize)]
pub struct ListResponse {
    #[serde(flatten)]
    view: ListView,
    overview: PageOverview,
}

#[derive(Serialize)]
pub struct HierarchyResponse {
    tree_id: i64,
    title: String,
    root: Option<HierarchyNode>,
    size: usize,
}

/// Nodo tal cual llega del backend, junto al rol y enlace derivados.
#[derive(Serialize)]
pub struct NodeView {
    node: Node,
    role: Role,
    link: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/list", get(list_handler))
        .route("/api/list/input", post(input_handler))
        .route("/api/list/page", post(page_handler))
        .route("/api/list/selection", post(toggle_selection_handler))
        .route("/api/list/selection/all", post(toggle_all_handler))
        .route("/api/list/export", get(consolidated_export_handler))
        .route("/api/trees/:id", delete(delete_handler))
        .route("/api/trees/:id/delete-prompt", get(delete_prompt_handler))
        .route("/api/trees/:id/hierarchy", get(hierarchy_handler))
        .route("/api/trees/:id/statistics", get(statistics_handler))
        .route("/api/trees/:id/nodes", get(nodes_handler))
        .route("/api/trees/:id/export/:format", get(export_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Utilidades de error ---

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::NotFound(_) => StatusCode::NOT_FOUND,
        BackendError::Failed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn export_error(err: &ExportError) -> ApiError {
    let status = match err {
        ExportError::NothingToExport(_) | ExportError::Hierarchy(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ExportError::DetailUnavailable { source, .. } => backend_status(source),
        ExportError::Backend(source) => backend_status(source),
        ExportError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, err.to_string())
}

/// Resumen del árbol en la página actual, o uno mínimo si no está en ella.
async fn summary_for(state: &AppState, id: i64) -> TreeSummary {
    state
        .list
        .lock()
        .await
        .find(id)
        .cloned()
        .unwrap_or_else(|| TreeSummary::bare(id))
}

async fn load_tree(state: &AppState, id: i64) -> Result<Tree, ApiError> {
    let summary = summary_for(state, id).await;
    match ensure_nodes(state.backend.as_ref(), &summary).await {
        Ok(tree) => Ok(tree),
        Err(e) => {
            state.notify_error(e.to_string()).await;
            Err(export_error(&e))
        }
    }
}

/// Pide la página del historial si hace falta.
///
/// La petición se hace sin el lock: si entretanto cambia la clave o se
/// invalida la página, `complete` descarta esta respuesta. Si el handler se
/// cancela a mitad, el ticket se suelta y el siguiente `tick` la repite.
async fn sync_list(state: &AppState) {
    let ticket = state.list.lock().await.tick(Instant::now());
    let Some(ticket) = ticket else {
        return;
    };
    let result = state.backend.list_trees(&ticket.query).await;
    if let Err(e) = &result {
        state
            .notify_error(format!("Error al cargar el historial de árboles: {e}"))
            .await;
    }
    state.list.lock().await.complete(ticket, result);
}

// --- Handlers del historial ---

#[axum::debug_handler]
async fn list_handler(State(state): State<AppState>) -> Json<ListResponse> {
    sync_list(&state).await;

    let list = state.list.lock().await;
    let overview = list
        .current_page()
        .map(|page| PageOverview::from_page(page, Utc::now()))
        .unwrap_or_default();
    Json(ListResponse {
        view: list.view(),
        overview,
    })
}

#[axum::debug_handler]
async fn input_handler(
    State(state): State<AppState>,
    Json(payload): Json<InputPayload>,
) -> StatusCode {
    state.list.lock().await.input(&payload.text, Instant::now());
    StatusCode::ACCEPTED
}

#[axum::debug_handler]
async fn page_handler(
    State(state): State<AppState>,
    Json(payload): Json<PagePayload>,
) -> Json<ListView> {
    let mut list = state.list.lock().await;
    list.update(|s| {
        let s = match payload.page_size {
            Some(size) => s.with_page_size(size),
            None => s,
        };
        match payload.page {
            Some(page) => s.with_page(page),
            None => s,
        }
    });
    Json(list.view())
}

#[axum::debug_handler]
async fn toggle_selection_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectionPayload>,
) -> Json<ListView> {
    let mut list = state.list.lock().await;
    list.update(|s| s.toggle_selected(payload.id));
    Json(list.view())
}

#[axum::debug_handler]
async fn toggle_all_handler(State(state): State<AppState>) -> Json<ListView> {
    let mut list = state.list.lock().await;
    let ids = list.page_ids();
    list.update(|s| s.toggle_select_all(&ids));
    Json(list.view())
}

#[axum::debug_handler]
async fn consolidated_export_handler(
    State(state): State<AppState>,
) -> Result<Download, ApiError> {
    let selected = {
        let list = state.list.lock().await;
        let selected = list.selected_summaries();
        let total = list.state().selection.len();
        if selected.len() < total {
            info!(
                "Exportación consolidada: {} de {total} árboles seleccionados están en la página actual",
                selected.len()
            );
        }
        selected
    };
    match export::export_consolidated(&selected, Utc::now().date_naive()) {
        Ok(download) => {
            state
                .notify(format!("Descarga iniciada: {}", download.filename))
                .await;
            Ok(download)
        }
        Err(e) => {
            state.notify_error(e.to_string()).await;
            Err(export_error(&e))
        }
    }
}

// --- Handlers de un árbol ---

#[axum::debug_handler]
async fn export_handler(
    State(state): State<AppState>,
    Path((id, format)): Path<(i64, String)>,
) -> Result<Download, ApiError> {
    let format = ExportFormat::from_str(&format)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?;
    let summary = summary_for(&state, id).await;

    let result = export::export_tree(
        state.backend.as_ref(),
        &summary,
        format,
        state.config.stats_scheme,
        Utc::now().date_naive(),
    )
    .await;

    match result {
        Ok(download) => {
            state
                .notify(format!(
                    "Descarga iniciada: el archivo {} se está descargando.",
                    format.extension().to_uppercase()
                ))
                .await;
            Ok(download)
        }
        Err(e) => {
            state
                .notify_error(format!("No se pudo descargar el archivo: {e}"))
                .await;
            Err(export_error(&e))
        }
    }
}

#[axum::debug_handler]
async fn hierarchy_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<HierarchyResponse>, ApiError> {
    let tree = load_tree(&state, id).await?;
    let nodes = tree.nodes().unwrap_or_default();

    match hierarchy::reconstruct(nodes, state.config.hierarchy_scheme) {
        Ok(root) => {
            let size = root.as_ref().map(HierarchyNode::size).unwrap_or(0);
            info!("Jerarquía del árbol {id}: {size} de {} nodos", nodes.len());
            Ok(Json(HierarchyResponse {
                tree_id: tree.id,
                title: tree.display_title(),
                root,
                size,
            }))
        }
        Err(e) => {
            let err = ExportError::from(e);
            state.notify_error(err.to_string()).await;
            Err(export_error(&err))
        }
    }
}

#[axum::debug_handler]
async fn statistics_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TreeStatistics>, ApiError> {
    let tree = load_tree(&state, id).await?;
    let stats = TreeStatistics::compute(tree.nodes().unwrap_or_default(), state.config.stats_scheme);
    if let Some(embedded) = &tree.arbol_json.statistics {
        stats.check_against(embedded, tree.id);
    }
    Ok(Json(stats))
}

#[axum::debug_handler]
async fn nodes_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<NodesParams>,
) -> Result<Json<Vec<NodeView>>, ApiError> {
    let tree = load_tree(&state, id).await?;
    let scheme = state.config.filter_scheme;
    let nodes = tree
        .nodes()
        .unwrap_or_default()
        .iter()
        .map(|node| (scheme.classify(node), node))
        .filter(|(role, _)| params.role.matches(*role))
        .map(|(role, node)| NodeView {
            link: node.external_link(),
            node: node.clone(),
            role,
        })
        .collect();
    Ok(Json(nodes))
}

#[axum::debug_handler]
async fn delete_prompt_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    let summary = summary_for(&state, id).await;
    Json(json!({ "prompt": list::delete_prompt(summary.title.as_deref(), id) }))
}

#[axum::debug_handler]
async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, ApiError> {
    // El borrado remoto no retiene el lock del historial.
    match list::delete_tree(state.backend.as_ref(), id, params.confirm).await {
        Ok(()) => {
            state.list.lock().await.forget_deleted(id);
            sync_list(&state).await;
            state.notify("Árbol eliminado: el árbol ha sido eliminado exitosamente.").await;
            Ok((StatusCode::OK, Json(json!({ "message": "Árbol eliminado exitosamente." }))))
        }
        Err(ListError::NotConfirmed(_)) => {
            let summary = summary_for(&state, id).await;
            Err((
                StatusCode::PRECONDITION_REQUIRED,
                Json(json!({
                    "error": "Se requiere confirmación para eliminar el árbol.",
                    "prompt": list::delete_prompt(summary.title.as_deref(), id),
                })),
            ))
        }
        Err(ListError::Backend(e)) => {
            state
                .notify_error("No se pudo eliminar el árbol. Intente nuevamente.")
                .await;
            Err(error_body(backend_status(&e), e.to_string()))
        }
    }
}

// --- Estado y apagado ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().await.clone())
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().await.take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
