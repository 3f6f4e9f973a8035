pub mod store;
pub mod types;

pub use store::{HistoryStore, JsonFileStore, MemoryStore};
pub use types::{Identity, Speaker, StoredMessage};
