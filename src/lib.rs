#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod bot;
pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod providers;
pub mod roles;
pub mod session;
pub mod stats;
pub mod tokens;

pub use config::Config;
pub use error::RelayError;
pub use roles::Role;
pub use session::SessionManager;
pub use stats::UsageStats;
