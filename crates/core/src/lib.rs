//! plastigit core library.
//!
//! This crate replays a Plastic SCM history export into a Git repository:
//! history parsing, branch mapping, working-tree reconciliation, commit
//! emission, the source/destination clients, and the migration driver.

pub mod branch;
pub mod commit;
pub mod config;
pub mod driver;
pub mod errors;
pub mod git;
pub mod history;
pub mod message;
pub mod models;
pub mod plastic;
pub mod reconcile;

// Re-exports for convenience.
pub use config::MigrationConfig;
pub use driver::{migrate, Migration, MigrationObserver, ReplaySettings};
pub use git::GitClient;
pub use history::History;
pub use plastic::PlasticClient;
