//! Sequencing of create/update/delete/status-change against the remote API.
//!
//! Every operation either invalidates the affected queries after the remote
//! call succeeded or leaves the cache untouched. Per-record pending flags are
//! held by RAII guards so an operation future that is dropped midway still
//! returns its record to idle.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use shared::{
    domain::{DocumentId, DocumentPayload, Documento, Estado},
    protocol::{DeleteReceipt, StatusChangeRequest},
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    cache::QueryClient,
    confirm::Confirmation,
    error::{ClientError, ErrorKind, FieldErrors},
    events::{ClientEvent, Notification},
    fingerprint::QueryFamily,
    navigation::{Destination, Navigator},
    transport::{DocumentApi, StatusWebhook},
    validation::{DocumentDraft, DocumentValidator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Delete,
    StatusChange,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Delete => "delete",
            OperationKind::StatusChange => "status change",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Idle,
    Confirming,
    InFlight,
    /// The last operation on the record finished; cleared by the next dialog.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub target: DocumentId,
    pub status: PendingStatus,
}

#[derive(Debug, Default)]
struct PendingState {
    /// In-flight and finished operations, one per record.
    ops: HashMap<DocumentId, PendingOperation>,
    /// Open dialogs. Each operation kind has its own dialog, so a record can
    /// await confirmation in both at once.
    confirming: BTreeSet<(DocumentId, OperationKind)>,
}

impl PendingState {
    fn in_flight(&self, id: DocumentId) -> Option<&PendingOperation> {
        self.ops
            .get(&id)
            .filter(|op| op.status == PendingStatus::InFlight)
    }

    fn confirming_kind(&self, id: DocumentId) -> Option<OperationKind> {
        self.confirming
            .range((id, OperationKind::Delete)..=(id, OperationKind::StatusChange))
            .map(|(_, kind)| *kind)
            .next()
    }
}

/// At most one in-flight operation per record.
#[derive(Clone)]
pub struct PendingRegistry {
    state: Arc<Mutex<PendingState>>,
    events: broadcast::Sender<ClientEvent>,
}

impl fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRegistry")
            .field("state", &*self.lock())
            .finish()
    }
}

impl PendingRegistry {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PendingState::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, id: DocumentId) -> PendingStatus {
        self.operation(id)
            .map_or(PendingStatus::Idle, |op| op.status)
    }

    /// The operation the record's row should reflect: in flight first, then an
    /// open dialog, then the last finished one.
    pub fn operation(&self, id: DocumentId) -> Option<PendingOperation> {
        let state = self.lock();
        if let Some(op) = state.in_flight(id) {
            return Some(*op);
        }
        if let Some(kind) = state.confirming_kind(id) {
            return Some(PendingOperation {
                kind,
                target: id,
                status: PendingStatus::Confirming,
            });
        }
        state.ops.get(&id).copied()
    }

    pub fn in_flight(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self
            .lock()
            .ops
            .values()
            .filter(|op| op.status == PendingStatus::InFlight)
            .copied()
            .collect();
        ops.sort_by_key(|op| op.target);
        ops
    }

    /// Marks `id` as awaiting confirmation of `kind`. Refused while it is in
    /// flight.
    pub fn mark_confirming(&self, id: DocumentId, kind: OperationKind) -> bool {
        let mut state = self.lock();
        if state.in_flight(id).is_some() {
            return false;
        }
        state.ops.remove(&id);
        state.confirming.insert((id, kind));
        true
    }

    pub fn clear_confirming(&self, id: DocumentId, kind: OperationKind) {
        self.lock().confirming.remove(&(id, kind));
    }

    /// Claims `id` for `kind`. `None` when another operation on the same
    /// record is already in flight.
    pub fn begin(&self, id: DocumentId, kind: OperationKind) -> Option<PendingGuard> {
        {
            let mut state = self.lock();
            // The dialog that led here is closed either way.
            state.confirming.remove(&(id, kind));
            if let Some(running) = state.in_flight(id) {
                warn!(%id, running = %running.kind, requested = %kind, "operation already in flight; ignoring");
                return None;
            }
            state.ops.insert(
                id,
                PendingOperation {
                    kind,
                    target: id,
                    status: PendingStatus::InFlight,
                },
            );
        }
        let _ = self.events.send(ClientEvent::PendingChanged {
            id,
            kind: Some(kind),
        });
        Some(PendingGuard {
            id,
            registry: self.clone(),
        })
    }
}

/// Moves one record from in flight to done when dropped.
pub struct PendingGuard {
    id: DocumentId,
    registry: PendingRegistry,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(op) = self.registry.lock().ops.get_mut(&self.id) {
            op.status = PendingStatus::Done;
        }
        let _ = self.registry.events.send(ClientEvent::PendingChanged {
            id: self.id,
            kind: None,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Populated for validation failures only.
    pub fields: FieldErrors,
}

impl From<ClientError> for MutationFailure {
    fn from(err: ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            fields: err.field_errors().cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    Ok(T),
    Failed(MutationFailure),
    /// Dropped without any side effect, e.g. the record was already busy.
    Ignored,
}

impl<T> MutationOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, MutationOutcome::Ok(_))
    }

    pub fn failure(&self) -> Option<&MutationFailure> {
        match self {
            MutationOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            MutationOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub id: DocumentId,
    pub anterior: Estado,
    pub nuevo: Estado,
    pub rows_affected: u64,
}

struct SubmitGuard(Arc<AtomicBool>);

impl SubmitGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitGuard(Arc::clone(flag)))
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct MutationOrchestrator {
    api: Arc<dyn DocumentApi>,
    webhook: Arc<dyn StatusWebhook>,
    validator: Arc<dyn DocumentValidator>,
    navigator: Arc<dyn Navigator>,
    queries: QueryClient,
    pending: PendingRegistry,
    events: broadcast::Sender<ClientEvent>,
    submitting: Arc<AtomicBool>,
}

impl MutationOrchestrator {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        webhook: Arc<dyn StatusWebhook>,
        validator: Arc<dyn DocumentValidator>,
        navigator: Arc<dyn Navigator>,
        queries: QueryClient,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            webhook,
            validator,
            navigator,
            queries,
            pending: PendingRegistry::new(events.clone()),
            events,
            submitting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    /// Whether a create or update form submission is running.
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(ClientEvent::Notification(notification));
    }

    fn notify_busy(&self, id: DocumentId) {
        self.notify(Notification::info(format!(
            "El documento {id} ya tiene una operación en curso"
        )));
    }

    fn validate(&self, draft: &DocumentDraft) -> Result<DocumentPayload, MutationFailure> {
        self.validator
            .validate(draft)
            .map_err(|fields| MutationFailure::from(ClientError::Validation(fields)))
    }

    pub async fn create(&self, draft: &DocumentDraft) -> MutationOutcome<Documento> {
        let Some(_submitting) = SubmitGuard::acquire(&self.submitting) else {
            return MutationOutcome::Ignored;
        };
        let payload = match self.validate(draft) {
            Ok(payload) => payload,
            Err(failure) => return MutationOutcome::Failed(failure),
        };

        info!(titulo = %payload.titulo, "creating documento");
        match self.api.create(&payload).await {
            Ok(doc) => {
                self.queries.invalidate_family(QueryFamily::Documentos).await;
                self.notify(Notification::success("Documento creado correctamente"));
                self.navigator.navigate(Destination::DocumentList);
                info!(id = %doc.id, "documento created");
                MutationOutcome::Ok(doc)
            }
            Err(err) => {
                warn!(error = %err, "create failed");
                self.notify(Notification::error("No se pudo crear el documento"));
                MutationOutcome::Failed(err.into())
            }
        }
    }

    pub async fn update(&self, id: DocumentId, draft: &DocumentDraft) -> MutationOutcome<Documento> {
        let Some(_submitting) = SubmitGuard::acquire(&self.submitting) else {
            return MutationOutcome::Ignored;
        };
        let payload = match self.validate(draft) {
            Ok(payload) => payload,
            Err(failure) => return MutationOutcome::Failed(failure),
        };

        info!(%id, "updating documento");
        match self.api.update(id, &payload).await {
            Ok(doc) => {
                self.queries.invalidate_family(QueryFamily::Documentos).await;
                self.queries.invalidate_document(id).await;
                self.notify(Notification::success("Documento actualizado"));
                MutationOutcome::Ok(doc)
            }
            Err(err) => {
                warn!(%id, error = %err, "update failed");
                self.notify(Notification::error("Error al actualizar"));
                MutationOutcome::Failed(err.into())
            }
        }
    }

    /// Runs a confirmed delete. The gate the confirmation came from closes when
    /// this returns or when the future is dropped.
    pub async fn delete(&self, confirmation: Confirmation<()>) -> MutationOutcome<DeleteReceipt> {
        let id = confirmation.target();
        let Some(_pending) = self.pending.begin(id, OperationKind::Delete) else {
            self.notify_busy(id);
            return MutationOutcome::Ignored;
        };

        info!(%id, "deleting documento");
        match self.api.delete(id).await {
            Ok(receipt) => {
                self.queries.invalidate_family(QueryFamily::Documentos).await;
                self.queries.invalidate_document(id).await;
                self.notify(Notification::success(format!("Documento {id} eliminado")));
                MutationOutcome::Ok(receipt)
            }
            Err(err) => {
                warn!(%id, error = %err, "delete failed");
                self.notify(Notification::error(format!(
                    "No se pudo eliminar el documento: {err}"
                )));
                MutationOutcome::Failed(err.into())
            }
        }
    }

    pub async fn change_status(
        &self,
        confirmation: Confirmation<Estado>,
    ) -> MutationOutcome<StatusTransition> {
        let id = confirmation.target();
        let nuevo_estado = *confirmation.payload();
        let Some(_pending) = self.pending.begin(id, OperationKind::StatusChange) else {
            self.notify_busy(id);
            return MutationOutcome::Ignored;
        };

        info!(%id, %nuevo_estado, "requesting status change");
        let request = StatusChangeRequest {
            document_id: id,
            nuevo_estado,
        };
        match self.webhook.change_status(&request).await {
            Ok(response) => {
                let transition = StatusTransition {
                    id: response.id,
                    anterior: response.estado_anterior,
                    nuevo: response.estado_nuevo,
                    rows_affected: response.rows_affected,
                };
                self.queries.invalidate_family(QueryFamily::Documentos).await;
                self.queries.invalidate_document(id).await;
                self.notify(Notification::success(format!(
                    "Estado actualizado: {} → {}",
                    transition.anterior, transition.nuevo
                )));
                MutationOutcome::Ok(transition)
            }
            Err(err) => {
                warn!(%id, error = %err, "status change failed");
                self.notify(Notification::error(format!(
                    "No se pudo cambiar el estado: {err}"
                )));
                MutationOutcome::Failed(err.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
