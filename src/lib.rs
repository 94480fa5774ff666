//! Stratus: a terminal dashboard for cloud resources.
//!
//! The library holds the engine (vault, sessions, resource registry, cache,
//! navigation and actions); the binary wires it to a ratatui front end.

pub mod actions;
pub mod cache;
pub mod error;
pub mod logging;
pub mod model;
pub mod nav;
pub mod registry;
pub mod remote;
pub mod session;
pub mod store;
pub mod tui;
pub mod vault;

mod tui_shell;
