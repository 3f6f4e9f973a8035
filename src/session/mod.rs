pub mod manager;

pub use manager::{ClearOutcome, Reply, SessionManager, SessionSettings};
