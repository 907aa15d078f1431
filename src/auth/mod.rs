// Authentication module
// Holds the shared token pair, renews it, and reports session termination

mod refresh;
mod session;
mod store;
mod types;

pub mod storage;

pub use refresh::{token_preview, RefreshMode, TokenRefresher};
pub use session::{SessionEvent, SessionEvents, TerminationReason};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::CredentialStore;
pub use types::Credentials;
