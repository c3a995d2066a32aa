//! HTTP and WebSocket adapter
//!
//! Exposes the engine operations as JSON endpoints and streams crash rounds
//! over a WebSocket. Holds no game state of its own.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};
