//! WebSocket endpoints, RPC routes, and connection plumbing.

pub mod connection;
pub mod routes;
pub mod urls;

pub use routes::{create_router, AppState};
