//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers change purchases; query handlers only read them.

pub mod handlers;

pub use handlers::billing::*;
