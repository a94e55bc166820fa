//! Adapters implementing the domain ports.

pub mod context;
pub mod memory;
pub mod notifiers;
pub mod specialists;
pub mod sqlite;

pub use context::DirectoryContextProvider;
pub use memory::InMemoryRecordStore;
pub use notifiers::{LogNotifier, RecordingNotifier, WebhookNotifier};
pub use specialists::{SimulatedBehavior, SimulatedSpecialists};
