pub mod ai;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use ai::{AiError, ChatBackend, ChatClientConfig, OpenAiChatClient};
pub use config::PalaverConfig;
pub use error::PalaverError;
pub use models::{Message, Role, SessionData};
pub use store::{create_store, FileSessionStore, MemorySessionStore, SessionStore, StoreError};
