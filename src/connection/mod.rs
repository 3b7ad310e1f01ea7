// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: the shared handle
//! used by dispatch, the read loop that emits events, and the cleanup guard.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handle;
mod handler;

// Publicly re-export the primary types from the sub-modules.
pub use guard::ConnectionGuard;
pub use handle::{ConnectionHandle, ConnectionState};
pub use handler::{ConnectionHandler, ExitReason};
