//! Module Exports
//!
//! This file exports the modules that carry remote gain updates into the
//! control loop.
//!
//! # Modules
//! - `gain`: the lock-free gain cell and payload extraction.
//! - `link`: bounded wait for network association at startup.
//! - `server`: HTTP and WebSocket routes that write into the gain cell.

pub mod gain;
pub mod link;
/// Module for the command server, its routes and WebSocket handling.
pub mod server;
