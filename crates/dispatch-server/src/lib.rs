//! `dispatchd`'s library half: the pieces `main.rs` wires together and
//! that integration tests exercise directly, split out the way
//! `axon`'s `lib.rs`/`main.rs` pair separates library code from the CLI
//! entry point.

pub mod agents;
pub mod dispatcher;
pub mod error;
pub mod reconciler;
pub mod routes;
pub mod sandbox_backend;
pub mod server;
pub mod state;
pub mod token_provider;
pub mod webhook;
