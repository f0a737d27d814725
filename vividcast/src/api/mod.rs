//! HTTP API.

pub mod error;
pub mod extract;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;

pub use server::{ApiServerConfig, AppState};
