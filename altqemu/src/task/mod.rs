//! Supervised tasks: configuration, persisted state, handles and the
//! registry that tracks them.

pub mod config;
mod handle;
pub mod state;
mod store;

pub use config::{DriverConfig, TaskConfig, TaskResources};
pub use handle::{SharedTaskHandle, TaskHandle};
pub use state::PersistedTaskState;
pub use store::TaskStore;
