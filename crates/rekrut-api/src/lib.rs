//! HTTP surface for rekrut
//!
//! JSON routes for login, logout, registration, and password management,
//! plus the session middleware consumed by the rest of the backend.

pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
