//! Controlador del historial: paginación, búsqueda con debounce, selección
//! múltiple y borrado confirmado.
//!
//! El estado visible es un valor explícito (`ListViewState`) que las
//! operaciones reciben y devuelven. El controlador sólo añade el ciclo de
//! vida de las peticiones: `Idle -> Loading -> Ready | Error`.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    backend::TreeBackend,
    error::{BackendError, ListError},
    models::{ListQuery, TreePage, TreeSummary},
};

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(700);
pub const MIN_SEARCH_CHARS: usize = 2;

/// Término de búsqueda efectivo: recortado y de al menos dos caracteres.
/// Más corto equivale a "sin filtro".
pub fn normalize_search(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (trimmed.chars().count() >= MIN_SEARCH_CHARS).then(|| trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListViewState {
    pub page: u32,
    pub page_size: u32,
    pub committed_search: Option<String>,
    pub selection: BTreeSet<i64>,
}

impl ListViewState {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            committed_search: None,
            selection: BTreeSet::new(),
        }
    }

    pub fn query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.committed_search.clone(),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Cambiar el tamaño de página vuelve a la primera.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        if page_size != self.page_size {
            self.page_size = page_size;
            self.page = 1;
        }
        self
    }

    /// Un término comprometido distinto vuelve a la primera página.
    pub fn with_committed_search(mut self, search: Option<String>) -> Self {
        if search != self.committed_search {
            self.committed_search = search;
            self.page = 1;
        }
        self
    }

    pub fn toggle_selected(mut self, id: i64) -> Self {
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
        self
    }

    /// Alterna entre "ninguno" y "todos los de la página actual".
    pub fn toggle_select_all(mut self, page_ids: &[i64]) -> Self {
        let page: BTreeSet<i64> = page_ids.iter().copied().collect();
        self.selection = if !page.is_empty() && self.selection == page {
            BTreeSet::new()
        } else {
            page
        };
        self
    }

    pub fn without(mut self, id: i64) -> Self {
        self.selection.remove(&id);
        self
    }
}

/// Buffer de entrada con debounce: el texto se actualiza en cada pulsación
/// y sólo se compromete tras `window` sin cambios.
#[derive(Debug, Clone)]
pub struct SearchDebouncer {
    buffer: String,
    dirty_since: Option<Instant>,
    window: Duration,
}

impl SearchDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            buffer: String::new(),
            dirty_since: None,
            window,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn input(&mut self, text: &str, now: Instant) {
        self.buffer = text.to_string();
        self.dirty_since = Some(now);
    }

    /// `Some(término)` cuando vence la ventana; `None` mientras no haya nada que comprometer.
    pub fn poll(&mut self, now: Instant) -> Option<Option<String>> {
        let since = self.dirty_since?;
        if now.saturating_duration_since(since) < self.window {
            return None;
        }
        self.dirty_since = None;
        Some(normalize_search(&self.buffer))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "lowercase")]
pub enum ListPhase {
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Vista serializable del historial.
#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub state: ListViewState,
    pub status: ListPhase,
    pub input: String,
    pub count: u64,
    pub items: Vec<TreeSummary>,
}

/// Petición de listado emitida por `tick`.
///
/// Mientras el ticket siga vivo la petición cuenta como en curso. Si se
/// descarta sin pasar por `complete` (el cliente se desconectó), el
/// siguiente `tick` vuelve a emitir la misma clave.
#[derive(Debug)]
pub struct ListTicket {
    pub query: ListQuery,
    generation: u64,
    _alive: Arc<()>,
}

#[derive(Debug)]
struct InFlight {
    query: ListQuery,
    generation: u64,
    alive: Weak<()>,
}

impl InFlight {
    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

pub struct ListController {
    state: ListViewState,
    phase: ListPhase,
    debouncer: SearchDebouncer,
    /// Última página resuelta; se mantiene visible mientras carga la siguiente.
    page: Option<TreePage>,
    loaded: Option<ListQuery>,
    in_flight: Option<InFlight>,
    /// Crece con cada petición emitida; sólo se acepta la respuesta de la última.
    generation: u64,
}

impl ListController {
    pub fn new(page_size: u32, debounce: Duration) -> Self {
        Self {
            state: ListViewState::new(page_size),
            phase: ListPhase::Idle,
            debouncer: SearchDebouncer::new(debounce),
            page: None,
            loaded: None,
            in_flight: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> &ListViewState {
        &self.state
    }

    pub fn phase(&self) -> &ListPhase {
        &self.phase
    }

    pub fn current_page(&self) -> Option<&TreePage> {
        self.page.as_ref()
    }

    /// Aplica una transición pura sobre el estado visible.
    pub fn update(&mut self, transition: impl FnOnce(ListViewState) -> ListViewState) {
        let state = std::mem::replace(&mut self.state, ListViewState::new(1));
        self.state = transition(state);
    }

    pub fn input(&mut self, text: &str, now: Instant) {
        self.debouncer.input(text, now);
    }

    /// Compromete la búsqueda si venció el debounce y devuelve el ticket de
    /// la petición a hacer, si hace falta una nueva.
    pub fn tick(&mut self, now: Instant) -> Option<ListTicket> {
        if let Some(search) = self.debouncer.poll(now) {
            self.update(|s| s.with_committed_search(search));
        }

        let query = self.state.query();
        if self.loaded.as_ref() == Some(&query) {
            // De vuelta a la página ya cargada: lo que hubiera en curso es de otra clave.
            if let Some(stale) = self.in_flight.take() {
                debug!(
                    "Petición de listado {:?} descartada; la página visible ya está cargada",
                    stale.query
                );
            }
            self.phase = ListPhase::Ready;
            return None;
        }
        if let Some(current) = &self.in_flight {
            if current.query == query && current.is_alive() {
                return None;
            }
            if current.is_alive() {
                debug!("Petición de listado {:?} reemplazada por {:?}", current.query, query);
            } else {
                debug!("Petición de listado {:?} abandonada; se vuelve a emitir", current.query);
            }
        }

        self.generation += 1;
        let alive = Arc::new(());
        self.in_flight = Some(InFlight {
            query: query.clone(),
            generation: self.generation,
            alive: Arc::downgrade(&alive),
        });
        self.phase = ListPhase::Loading;
        Some(ListTicket {
            query,
            generation: self.generation,
            _alive: alive,
        })
    }

    /// Aplica una respuesta. Sólo cuenta la de la última petición emitida y
    /// si su clave sigue siendo la visible; las demás se descartan. Devuelve
    /// si la respuesta se aplicó.
    pub fn complete(&mut self, ticket: ListTicket, result: Result<TreePage, BackendError>) -> bool {
        let current = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == ticket.generation)
            && ticket.query == self.state.query();
        if !current {
            debug!("Respuesta obsoleta del listado ignorada: {:?}", ticket.query);
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(page) => {
                self.page = Some(page);
                self.loaded = Some(ticket.query);
                self.phase = ListPhase::Ready;
            }
            Err(err) => {
                warn!("Error al cargar el historial: {err}");
                self.phase = ListPhase::Error(err.to_string());
            }
        }
        true
    }

    /// Olvida la página cargada para que el próximo `tick` la vuelva a pedir.
    /// Una petición en curso queda obsoleta: su respuesta es anterior al cambio.
    pub fn invalidate(&mut self) {
        self.loaded = None;
        self.in_flight = None;
    }

    /// Refleja un borrado confirmado: sale de la selección y la página se vuelve a pedir.
    pub fn forget_deleted(&mut self, id: i64) {
        self.update(|s| s.without(id));
        self.invalidate();
    }

    /// `tick` + petición + `complete` en un solo paso.
    pub async fn refresh(&mut self, backend: &dyn TreeBackend, now: Instant) -> bool {
        let Some(ticket) = self.tick(now) else {
            return false;
        };
        let result = backend.list_trees(&ticket.query).await;
        self.complete(ticket, result)
    }

    pub fn page_ids(&self) -> Vec<i64> {
        self.page
            .as_ref()
            .map(|p| p.results.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    pub fn find(&self, id: i64) -> Option<&TreeSummary> {
        self.page.as_ref()?.results.iter().find(|t| t.id == id)
    }

    /// Árboles seleccionados dentro del resultado actual, en su orden.
    pub fn selected_summaries(&self) -> Vec<TreeSummary> {
        self.page
            .as_ref()
            .map(|p| {
                p.results
                    .iter()
                    .filter(|t| self.state.selection.contains(&t.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn view(&self) -> ListView {
        ListView {
            state: self.state.clone(),
            status: self.phase.clone(),
            input: self.debouncer.buffer().to_string(),
            count: self.page.as_ref().map(|p| p.count).unwrap_or(0),
            items: self.page.as_ref().map(|p| p.results.clone()).unwrap_or_default(),
        }
    }
}

/// Texto de confirmación para borrar un árbol.
pub fn delete_prompt(title: Option<&str>, id: i64) -> String {
    let name = match title.filter(|t| !t.trim().is_empty()) {
        Some(t) => t.to_string(),
        None => format!("ID: {id}"),
    };
    format!("¿Está seguro de que desea eliminar el árbol \"{name}\"?")
}

/// Borra un árbol confirmado en el backend. No toca el controlador: si va
/// bien, quien llama aplica `ListController::forget_deleted` y vuelve a
/// pedir la página; si falla, el estado local no cambia.
pub async fn delete_tree(
    backend: &dyn TreeBackend,
    id: i64,
    confirmed: bool,
) -> Result<(), ListError> {
    if !confirmed {
        return Err(ListError::NotConfirmed(id));
    }
    backend.delete_tree(id).await?;
    info!("Árbol {id} eliminado");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MemoryBackend;
    use tokio_test::{assert_err, assert_ok};

    fn summaries(n: i64) -> Vec<TreeSummary> {
        (1..=n)
            .map(|id| {
                let mut s = TreeSummary::bare(id);
                s.title = Some(format!("Árbol número {id}"));
                s.seed = if id % 2 == 0 { "genómica".into() } else { "física".into() };
                s
            })
            .collect()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn short_terms_are_no_filter() {
        assert_eq!(normalize_search("  a "), None);
        assert_eq!(normalize_search(""), None);
        assert_eq!(normalize_search(" ab "), Some("ab".into()));
        assert_eq!(normalize_search("ñu"), Some("ñu".into()));
    }

    #[test]
    fn committing_a_new_search_resets_the_page() {
        let state = ListViewState::new(10).with_page(3);
        let same = state.clone().with_committed_search(None);
        assert_eq!(same.page, 3);
        let changed = state.with_committed_search(Some("redes".into()));
        assert_eq!(changed.page, 1);
    }

    #[test]
    fn select_all_toggles_current_page() {
        let page = [1, 2, 3];
        let state = ListViewState::new(10).toggle_selected(2);
        let all = state.toggle_select_all(&page);
        assert_eq!(all.selection, BTreeSet::from([1, 2, 3]));
        let none = all.toggle_select_all(&page);
        assert!(none.selection.is_empty());
        let other_page = none.toggle_selected(9).toggle_select_all(&page);
        assert_eq!(other_page.selection, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn debouncer_waits_for_silence() {
        let t0 = Instant::now();
        let mut d = SearchDebouncer::new(DEFAULT_SEARCH_DEBOUNCE);
        d.input("a", t0);
        d.input("ab", t0 + ms(200));
        d.input("abc", t0 + ms(400));
        assert_eq!(d.buffer(), "abc");
        assert_eq!(d.poll(t0 + ms(900)), None);
        assert_eq!(d.poll(t0 + ms(1100)), Some(Some("abc".into())));
        assert_eq!(d.poll(t0 + ms(5000)), None);
    }

    #[tokio::test]
    async fn typing_quickly_issues_one_search_query() {
        let backend = MemoryBackend::with_summaries(summaries(25));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        assert!(list.refresh(&backend, t0).await);

        list.input("a", t0 + ms(10));
        list.refresh(&backend, t0 + ms(20)).await;
        list.input("ab", t0 + ms(200));
        list.refresh(&backend, t0 + ms(300)).await;
        list.input("abc", t0 + ms(400));
        list.refresh(&backend, t0 + ms(600)).await;
        list.refresh(&backend, t0 + ms(1200)).await;
        list.refresh(&backend, t0 + ms(2000)).await;

        let searches: Vec<String> = backend
            .list_call_log()
            .into_iter()
            .filter_map(|q| q.search)
            .collect();
        assert_eq!(searches, ["abc"]);
        assert_eq!(list.state().committed_search.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn first_page_and_consolidated_selection() {
        let backend = MemoryBackend::with_summaries(summaries(25));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        assert_eq!(list.phase(), &ListPhase::Idle);
        list.refresh(&backend, t0).await;

        assert_eq!(list.phase(), &ListPhase::Ready);
        assert_eq!(list.page_ids(), (1..=10).collect::<Vec<_>>());
        assert_eq!(list.view().count, 25);

        list.update(|s| s.toggle_selected(3).toggle_selected(7));
        let selected = list.selected_summaries();
        let csv = crate::export::csv::encode_consolidated(&selected).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Árbol número 3"));
        assert!(lines[2].contains("Árbol número 7"));
    }

    #[tokio::test]
    async fn selection_survives_pagination() {
        let backend = MemoryBackend::with_summaries(summaries(25));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        list.refresh(&backend, t0).await;
        list.update(|s| s.toggle_selected(3).with_page(2));
        list.refresh(&backend, t0).await;
        assert_eq!(list.page_ids(), (11..=20).collect::<Vec<_>>());
        assert!(list.state().selection.contains(&3));
        assert!(list.selected_summaries().is_empty());
    }

    #[test]
    fn stale_response_is_ignored() {
        let t0 = Instant::now();
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let first = list.tick(t0).unwrap();

        list.input("redes", t0);
        let second = list.tick(t0 + ms(800)).unwrap();
        assert_ne!(first.query, second.query);

        let newer = TreePage {
            count: 1,
            results: summaries(1),
        };
        assert!(!list.complete(first, Ok(TreePage::default())));
        assert_eq!(list.phase(), &ListPhase::Loading);
        assert!(list.complete(second, Ok(newer.clone())));
        assert_eq!(list.current_page(), Some(&newer));
    }

    #[test]
    fn previous_page_stays_visible_while_loading_and_on_error() {
        let t0 = Instant::now();
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let ticket = list.tick(t0).unwrap();
        let page = TreePage {
            count: 2,
            results: summaries(2),
        };
        list.complete(ticket, Ok(page.clone()));

        list.update(|s| s.with_page(2));
        let ticket = list.tick(t0).unwrap();
        assert_eq!(list.phase(), &ListPhase::Loading);
        assert_eq!(list.view().items, page.results);

        list.complete(ticket, Err(BackendError::Failed("HTTP 502".into())));
        assert!(matches!(list.phase(), ListPhase::Error(_)));
        assert_eq!(list.current_page(), Some(&page));
    }

    #[tokio::test]
    async fn returning_to_a_loaded_page_discards_the_pending_one() {
        let backend = MemoryBackend::with_summaries(summaries(25));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        list.refresh(&backend, t0).await;

        list.update(|s| s.with_page(2));
        let second = list.tick(t0).unwrap();
        list.update(|s| s.with_page(1));
        assert!(list.tick(t0).is_none());
        assert_eq!(list.phase(), &ListPhase::Ready);

        let second_page = backend.list_trees(&second.query).await;
        assert!(!list.complete(second, second_page));
        assert_eq!(list.page_ids(), (1..=10).collect::<Vec<_>>());
        assert_eq!(list.phase(), &ListPhase::Ready);
    }

    #[test]
    fn dropped_request_for_a_page_left_behind_does_not_stay_loading() {
        let t0 = Instant::now();
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let first = list.tick(t0).unwrap();
        list.complete(first, Ok(TreePage::default()));

        list.update(|s| s.with_page(2));
        let second = list.tick(t0).unwrap();
        list.update(|s| s.with_page(1));
        assert!(list.tick(t0).is_none());
        drop(second);
        assert_eq!(list.phase(), &ListPhase::Ready);
        assert!(list.tick(t0).is_none());
    }

    #[test]
    fn response_for_a_key_no_longer_shown_is_rejected() {
        let t0 = Instant::now();
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let first = list.tick(t0).unwrap();
        list.update(|s| s.with_page(3));
        assert!(!list.complete(first, Ok(TreePage::default())));
        assert!(list.current_page().is_none());
    }

    #[test]
    fn loaded_key_is_not_refetched_until_invalidated() {
        let t0 = Instant::now();
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let ticket = list.tick(t0).unwrap();
        let query = ticket.query.clone();
        assert!(list.tick(t0).is_none());
        list.complete(ticket, Ok(TreePage::default()));
        assert!(list.tick(t0).is_none());
        list.invalidate();
        assert_eq!(list.tick(t0).map(|t| t.query), Some(query));
    }

    #[tokio::test]
    async fn abandoned_request_is_issued_again() {
        let backend = MemoryBackend::with_summaries(summaries(3));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();

        let ticket = list.tick(t0).unwrap();
        assert!(list.tick(t0).is_none());
        drop(ticket);

        assert!(list.refresh(&backend, t0).await);
        assert_eq!(list.phase(), &ListPhase::Ready);
        assert_eq!(list.page_ids(), vec![1, 2, 3]);
        assert_eq!(backend.list_call_log().len(), 1);
    }

    #[tokio::test]
    async fn response_fetched_before_a_delete_is_discarded() {
        let backend = MemoryBackend::with_summaries(summaries(3));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        list.refresh(&backend, t0).await;

        list.invalidate();
        let before_delete = list.tick(t0).unwrap();
        let old_page = backend.list_trees(&before_delete.query).await;

        assert_ok!(delete_tree(&backend, 2, true).await);
        list.forget_deleted(2);
        assert!(!list.complete(before_delete, old_page));

        assert!(list.refresh(&backend, t0).await);
        assert_eq!(list.page_ids(), vec![1, 3]);
    }

    #[test]
    fn delete_prompt_uses_title_or_id() {
        assert_eq!(
            delete_prompt(Some("Mi árbol"), 4),
            "¿Está seguro de que desea eliminar el árbol \"Mi árbol\"?"
        );
        assert_eq!(
            delete_prompt(None, 4),
            "¿Está seguro de que desea eliminar el árbol \"ID: 4\"?"
        );
    }

    #[tokio::test]
    async fn delete_requires_confirmation_and_refetches() {
        let backend = MemoryBackend::with_summaries(summaries(3));
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        list.refresh(&backend, t0).await;
        list.update(|s| s.toggle_selected(2));

        let err = assert_err!(delete_tree(&backend, 2, false).await);
        assert!(matches!(err, ListError::NotConfirmed(2)));
        assert!(backend.delete_calls.lock().unwrap().is_empty());

        assert_ok!(delete_tree(&backend, 2, true).await);
        list.forget_deleted(2);
        assert!(list.refresh(&backend, t0).await);
        assert_eq!(list.page_ids(), vec![1, 3]);
        assert!(list.state().selection.is_empty());
        assert_eq!(backend.list_call_log().len(), 2);
    }

    #[tokio::test]
    async fn failed_delete_leaves_state_untouched() {
        let backend = MemoryBackend {
            fail_deletes: true,
            ..MemoryBackend::with_summaries(summaries(3))
        };
        let mut list = ListController::new(10, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        list.refresh(&backend, t0).await;
        list.update(|s| s.toggle_selected(2));
        let before = list.state().clone();

        assert_err!(delete_tree(&backend, 2, true).await);
        assert_eq!(list.state(), &before);
        assert_eq!(list.page_ids(), vec![1, 2, 3]);
        assert_eq!(backend.list_call_log().len(), 1);
    }
}
