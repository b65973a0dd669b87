//! worldgate-state: embedded world catalog.
//!
//! Backed by [redb](https://docs.rs/redb). Records which build each world
//! runs and whether the gateway had it active, so the activation
//! bootstrap can bring the same worlds back after a restart.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
