//! Client core of the document registry: query cache, list state, mutation
//! orchestration and confirmation gates over the registry HTTP API.

pub mod cache;
pub mod config;
pub mod confirm;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod list_state;
pub mod mutation;
pub mod navigation;
pub mod registry;
pub mod transport;
pub mod validation;

pub use cache::{Invalidation, QueryCache, QueryClient, QuerySnapshot};
pub use config::{load_settings, ClientSettings};
pub use confirm::{Confirmation, ConfirmationGate, DeleteGate, GateError, GateStatus, StatusGate};
pub use error::{ClientError, ErrorKind, FieldErrors};
pub use events::{ClientEvent, Notification, NotificationLevel};
pub use fingerprint::{fingerprint, ListFingerprint, PageSize, QueryFamily, QueryKey};
pub use list_state::{ListFilters, ListState, SortColumn, SortDirection, SortState};
pub use mutation::{
    MutationFailure, MutationOrchestrator, MutationOutcome, OperationKind, PendingOperation,
    PendingStatus, StatusTransition,
};
pub use navigation::{Destination, LoggingNavigator, Navigator};
pub use registry::{DocumentRegistry, ListView};
pub use transport::{DocumentApi, HttpDocumentApi, HttpStatusWebhook, StatusWebhook};
pub use validation::{DocumentDraft, DocumentValidator, SchemaValidator};
