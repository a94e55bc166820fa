//! Ports (interfaces) for the Harmony request engine
//!
//! The engine reaches every collaborator through one of these traits; the
//! handles are injected at construction time.

pub mod context_provider;
pub mod notifier;
pub mod record_store;
pub mod specialist;

pub use context_provider::{ContextError, ContextProvider};
pub use notifier::{Notification, NotifyError, Notifier};
pub use record_store::{merge_patch, EntityKind, RecordStore, StoreError};
pub use specialist::{AssignmentContext, DispatchError, SpecialistDispatcher, SpecialistReport};
