//! worldgate-routes: which base address serves which world.
//!
//! The orchestrator writes routes through the [`RouteRegistry`] trait;
//! the gateway proxy reads them from the concrete [`RouteTable`].

pub mod table;

pub use table::{RouteRegistry, RouteTable};
