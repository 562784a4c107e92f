use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

use crate::{backend::TreeBackend, config::AppConfig, list::ListController};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn TreeBackend>,
    pub list: Arc<Mutex<ListController>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Última notificación visible para el usuario.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_error: bool,
    pub message: String,
}

impl AppState {
    pub async fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        *self.status.lock().await = Status {
            is_error: false,
            message,
        };
    }

    pub async fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        *self.status.lock().await = Status {
            is_error: true,
            message,
        };
    }
}
