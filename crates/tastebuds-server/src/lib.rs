//! Tastebuds HTTP server: routes, shared state, admin helpers.

pub mod admin;
pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
