//! The document registry as seen by a front end: the list view model, row
//! actions behind confirmation gates, and form submissions.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use shared::{
    domain::{DocumentId, Documento, Estado},
    protocol::{DeleteReceipt, DocumentPage},
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{
    cache::{QueryClient, QuerySnapshot},
    config::ClientSettings,
    confirm::{DeleteGate, GateError, GateStatus, StatusGate},
    error::ClientError,
    events::ClientEvent,
    fingerprint::{ListFingerprint, PageSize},
    list_state::{ListFilters, ListState, SortColumn, SortState},
    mutation::{
        MutationOrchestrator, MutationOutcome, OperationKind, PendingOperation, PendingStatus,
        StatusTransition,
    },
    navigation::Navigator,
    transport::{DocumentApi, HttpDocumentApi, HttpStatusWebhook, StatusWebhook},
    validation::{DocumentDraft, DocumentValidator, SchemaValidator},
};

/// Everything the list screen renders.
#[derive(Debug, Clone)]
pub struct ListView {
    pub fingerprint: ListFingerprint,
    /// Rows of the displayed page, ordered by the active sort.
    pub rows: Vec<Documento>,
    pub total: Option<u64>,
    pub page: u32,
    pub page_size: PageSize,
    pub total_pages: u32,
    pub can_go_prev: bool,
    pub can_go_next: bool,
    pub draft: ListFilters,
    pub filters: ListFilters,
    pub sort: Option<SortState>,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_placeholder: bool,
    pub is_stale: bool,
    pub error: Option<ClientError>,
    pub pending: Vec<PendingOperation>,
}

impl ListView {
    pub fn pending_for(&self, id: DocumentId) -> Option<&PendingOperation> {
        self.pending.iter().find(|op| op.target == id)
    }
}

pub struct DocumentRegistry {
    api: Arc<dyn DocumentApi>,
    queries: QueryClient,
    list: Mutex<ListState>,
    mutations: MutationOrchestrator,
    delete_gate: DeleteGate,
    status_gate: StatusGate,
    events: broadcast::Sender<ClientEvent>,
}

impl DocumentRegistry {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        webhook: Arc<dyn StatusWebhook>,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        Self::new_with_dependencies(
            api,
            webhook,
            Arc::new(SchemaValidator::default()),
            navigator,
            QueryClient::new(),
        )
    }

    pub fn new_with_dependencies(
        api: Arc<dyn DocumentApi>,
        webhook: Arc<dyn StatusWebhook>,
        validator: Arc<dyn DocumentValidator>,
        navigator: Arc<dyn Navigator>,
        queries: QueryClient,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let mutations = MutationOrchestrator::new(
            Arc::clone(&api),
            webhook,
            validator,
            navigator,
            queries.clone(),
            events.clone(),
        );
        Arc::new(Self {
            api,
            queries,
            list: Mutex::new(ListState::new()),
            mutations,
            delete_gate: DeleteGate::new(OperationKind::Delete),
            status_gate: StatusGate::new(OperationKind::StatusChange),
            events,
        })
    }

    /// HTTP-backed registry using the configured API and webhook.
    pub fn from_settings(
        settings: &ClientSettings,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Arc<Self>, ClientError> {
        Ok(Self::new(
            Arc::new(HttpDocumentApi::from_settings(settings)?),
            Arc::new(HttpStatusWebhook::from_settings(settings)?),
            navigator,
        ))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    fn search_fetcher(
        &self,
        key: &ListFingerprint,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<DocumentPage, ClientError>> {
        let api = Arc::clone(&self.api);
        let query = key.to_search_query();
        move || async move { api.search(&query).await }.boxed()
    }

    fn build_view(&self, list: &mut ListState, snapshot: QuerySnapshot<DocumentPage>) -> ListView {
        // Page bounds follow the key's own data, never a placeholder.
        if let Some(page) = snapshot.data.as_ref().filter(|_| !snapshot.is_placeholder) {
            list.observe_total(page.total);
        }
        let rows = snapshot
            .data
            .as_ref()
            .map(|page| list.sort_rows(&page.items))
            .unwrap_or_default();
        ListView {
            fingerprint: list.fingerprint(),
            rows,
            total: list.total(),
            page: list.page(),
            page_size: list.page_size(),
            total_pages: list.total_pages(),
            can_go_prev: list.can_go_prev(),
            can_go_next: list.can_go_next(),
            draft: list.draft().clone(),
            filters: list.committed().clone(),
            sort: list.sort(),
            is_loading: snapshot.is_loading,
            is_fetching: snapshot.is_fetching,
            is_placeholder: snapshot.is_placeholder,
            is_stale: snapshot.is_stale,
            error: snapshot.error,
            pending: self.mutations.pending().in_flight(),
        }
    }

    /// Resolves the current fingerprint, fetching when needed, and returns what
    /// to render right now.
    pub async fn list_view(&self) -> ListView {
        let mut list = self.list.lock().await;
        let key = list.fingerprint();
        let fetch = self.search_fetcher(&key);
        let snapshot = self.queries.documentos().resolve(key, fetch).await;
        self.build_view(&mut list, snapshot)
    }

    /// Resolves the current fingerprint and waits for its request, if one is
    /// running, before returning the view.
    pub async fn settle_list(&self) -> ListView {
        let pending = self.list_view().await;
        self.queries
            .documentos()
            .settle(&pending.fingerprint)
            .await;
        self.list_view().await
    }

    /// Manual retry of the current list query.
    pub async fn refetch_list(&self) -> ListView {
        let mut list = self.list.lock().await;
        let key = list.fingerprint();
        let fetch = self.search_fetcher(&key);
        let snapshot = self.queries.documentos().refetch(key, fetch).await;
        self.build_view(&mut list, snapshot)
    }

    pub async fn set_draft_autor(&self, autor: impl Into<String>) {
        self.list.lock().await.set_draft_autor(autor);
    }

    pub async fn set_draft_estado(&self, estado: Option<Estado>) {
        self.list.lock().await.set_draft_estado(estado);
    }

    pub async fn apply_filters(&self) {
        let mut list = self.list.lock().await;
        list.apply_filters();
        debug!(filters = ?list.committed(), "filters applied");
    }

    pub async fn clear_filters(&self) {
        self.list.lock().await.clear_filters();
    }

    pub async fn set_page_size(&self, page_size: PageSize) {
        self.list.lock().await.set_page_size(page_size);
    }

    pub async fn set_page(&self, page: u32) -> u32 {
        self.list.lock().await.set_page(page)
    }

    pub async fn next_page(&self) -> u32 {
        self.list.lock().await.next_page()
    }

    pub async fn prev_page(&self) -> u32 {
        self.list.lock().await.prev_page()
    }

    pub async fn toggle_sort(&self, column: SortColumn) -> Option<SortState> {
        self.list.lock().await.toggle_sort(column)
    }

    pub async fn document(&self, id: DocumentId) -> QuerySnapshot<Documento> {
        let api = Arc::clone(&self.api);
        self.queries
            .documento()
            .resolve(id, move || async move { api.fetch(id).await })
            .await
    }

    pub async fn settle_document(&self, id: DocumentId) -> QuerySnapshot<Documento> {
        self.document(id).await;
        self.queries.documento().settle(&id).await;
        self.queries.documento().snapshot(&id).await
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.api.health().await
    }

    pub fn pending_status(&self, id: DocumentId) -> PendingStatus {
        self.mutations.pending().status(id)
    }

    pub fn is_submitting(&self) -> bool {
        self.mutations.is_submitting()
    }

    pub fn delete_dialog(&self) -> GateStatus {
        self.delete_gate.status()
    }

    pub fn status_dialog(&self) -> GateStatus {
        self.status_gate.status()
    }

    fn ensure_idle(&self, id: DocumentId) -> Result<(), GateError> {
        match self.mutations.pending().status(id) {
            PendingStatus::InFlight => Err(GateError::InFlight(id)),
            _ => Ok(()),
        }
    }

    /// Opens the delete dialog for `id`.
    pub fn request_delete(&self, id: DocumentId) -> Result<(), GateError> {
        self.ensure_idle(id)?;
        let previous = self.delete_gate.status();
        self.delete_gate.open(id, ())?;
        if let GateStatus::Open(previous) = previous {
            self.mutations
                .pending()
                .clear_confirming(previous, OperationKind::Delete);
        }
        self.mutations
            .pending()
            .mark_confirming(id, OperationKind::Delete);
        Ok(())
    }

    /// Dismisses the delete dialog. Refused when no dialog is open and a
    /// confirmed delete is still running.
    pub fn cancel_delete(&self) -> Result<(), GateError> {
        let previous = self.delete_gate.status();
        self.delete_gate.cancel()?;
        if let GateStatus::Open(target) = previous {
            self.mutations
                .pending()
                .clear_confirming(target, OperationKind::Delete);
        }
        Ok(())
    }

    pub async fn confirm_delete(&self) -> Result<MutationOutcome<DeleteReceipt>, GateError> {
        let confirmation = self.delete_gate.confirm()?;
        Ok(self.mutations.delete(confirmation).await)
    }

    /// Opens the status dialog for `id`, proposing `estado`.
    pub fn request_status_change(&self, id: DocumentId, estado: Estado) -> Result<(), GateError> {
        self.ensure_idle(id)?;
        let previous = self.status_gate.status();
        self.status_gate.open(id, estado)?;
        if let GateStatus::Open(previous) = previous {
            self.mutations
                .pending()
                .clear_confirming(previous, OperationKind::StatusChange);
        }
        self.mutations
            .pending()
            .mark_confirming(id, OperationKind::StatusChange);
        Ok(())
    }

    pub fn cancel_status_change(&self) -> Result<(), GateError> {
        let previous = self.status_gate.status();
        self.status_gate.cancel()?;
        if let GateStatus::Open(target) = previous {
            self.mutations
                .pending()
                .clear_confirming(target, OperationKind::StatusChange);
        }
        Ok(())
    }

    pub async fn confirm_status_change(
        &self,
    ) -> Result<MutationOutcome<StatusTransition>, GateError> {
        let confirmation = self.status_gate.confirm()?;
        Ok(self.mutations.change_status(confirmation).await)
    }

    pub async fn create(&self, draft: &DocumentDraft) -> MutationOutcome<Documento> {
        self.mutations.create(draft).await
    }

    pub async fn update(&self, id: DocumentId, draft: &DocumentDraft) -> MutationOutcome<Documento> {
        self.mutations.update(id, draft).await
    }
}
