mod cfg;
pub use cfg::*;
mod telemetry;
pub use telemetry::*;
mod errors;
pub use errors::*;

pub mod api;
pub mod app;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;
pub mod upload;

pub use api::{RagApi, RagClient};
pub use app::{App, DocumentEntry};
pub use registry::CollectionRegistry;
pub use session::ConversationSession;
pub use store::{HistoryStore, KvBackend, MemoryBackend, SqliteBackend};
pub use upload::{UploadCoordinator, UploadState};
