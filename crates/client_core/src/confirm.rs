//! Two-step confirmation for destructive and remote side-effecting actions.
//!
//! `confirm` hands out a [`Confirmation`] token that the mutation orchestrator
//! consumes. Its target stays in flight, and its dialog refuses to be
//! dismissed, until that token is dropped, which happens on every exit path of
//! the operation. Other targets can be opened and confirmed meanwhile.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::{DocumentId, Estado};
use thiserror::Error;

use crate::mutation::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no confirmation is open")]
    NotOpen,
    #[error("operation on document {0} is already in progress")]
    InFlight(DocumentId),
}

/// What the dialog shows. An open dialog takes precedence over confirmed
/// operations still running for other targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Closed,
    Open(DocumentId),
    InFlight(DocumentId),
}

struct GateState<P> {
    dialog: Option<(DocumentId, P)>,
    running: BTreeSet<DocumentId>,
}

impl<P> GateState<P> {
    fn status(&self) -> GateStatus {
        match (&self.dialog, self.first_running()) {
            (Some((target, _)), _) => GateStatus::Open(*target),
            (None, Some(running)) => GateStatus::InFlight(running),
            (None, None) => GateStatus::Closed,
        }
    }

    fn first_running(&self) -> Option<DocumentId> {
        self.running.iter().next().copied()
    }
}

type SharedState<P> = Arc<Mutex<GateState<P>>>;

fn lock<P>(state: &SharedState<P>) -> MutexGuard<'_, GateState<P>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gate for one operation kind. `P` is what the dialog is confirming, e.g. the
/// requested status for a status change.
pub struct ConfirmationGate<P> {
    kind: OperationKind,
    state: SharedState<P>,
}

pub type DeleteGate = ConfirmationGate<()>;
pub type StatusGate = ConfirmationGate<Estado>;

impl<P> Clone for ConfirmationGate<P> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            state: Arc::clone(&self.state),
        }
    }
}

impl<P> fmt::Debug for ConfirmationGate<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

impl<P> ConfirmationGate<P> {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(GateState {
                dialog: None,
                running: BTreeSet::new(),
            })),
        }
    }

    pub fn status(&self) -> GateStatus {
        lock(&self.state).status()
    }

    /// Opens (or retargets) the dialog. Refused for a target whose confirmed
    /// operation of this kind is still running.
    pub fn open(&self, target: DocumentId, payload: P) -> Result<(), GateError> {
        let mut state = lock(&self.state);
        if state.running.contains(&target) {
            return Err(GateError::InFlight(target));
        }
        state.dialog = Some((target, payload));
        Ok(())
    }

    /// Dismisses the open dialog. With no dialog open, a running confirmed
    /// operation cannot be dismissed; otherwise this is a no-op.
    pub fn cancel(&self) -> Result<(), GateError> {
        let mut state = lock(&self.state);
        if state.dialog.take().is_none() {
            if let Some(running) = state.first_running() {
                return Err(GateError::InFlight(running));
            }
        }
        Ok(())
    }

    pub fn confirm(&self) -> Result<Confirmation<P>, GateError> {
        let mut state = lock(&self.state);
        let Some((target, payload)) = state.dialog.take() else {
            return Err(state
                .first_running()
                .map_or(GateError::NotOpen, GateError::InFlight));
        };
        state.running.insert(target);
        Ok(Confirmation {
            kind: self.kind,
            target,
            payload,
            gate: Arc::clone(&self.state),
        })
    }
}

/// Proof that the user confirmed an operation on `target`. Dropping it releases
/// the target in the gate it came from.
pub struct Confirmation<P> {
    kind: OperationKind,
    target: DocumentId,
    payload: P,
    gate: SharedState<P>,
}

impl<P> Confirmation<P> {
    pub fn target(&self) -> DocumentId {
        self.target
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P> fmt::Debug for Confirmation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Confirmation")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<P> Drop for Confirmation<P> {
    fn drop(&mut self) {
        lock(&self.gate).running.remove(&self.target);
    }
}

#[cfg(test)]
#[path = "tests/confirm_tests.rs"]
mod tests;
