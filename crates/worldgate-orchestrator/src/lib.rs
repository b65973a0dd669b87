//! worldgate-orchestrator: the instance control plane.
//!
//! The [`Orchestrator`] keeps one running unit per game version and
//! assigns each world to exactly one of them, driving a
//! [`Launcher`](worldgate_launcher::Launcher), the health prober and the
//! route registry. [`restore_active_worlds`] replays the catalog's active
//! worlds through it at startup.

pub mod bootstrap;
pub mod error;
mod guard;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{RestoreReport, restore_active_worlds};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
