//! HTTP surface of the report-intake ticket bridge.
//!
//! Wires the OAuth login/callback routes, the multipart submission route,
//! static evidence serving, and the Discord interactions webhook onto the
//! ticket workflow.

pub mod auth_routes;
pub mod evidence_store;
pub mod interaction_routes;
pub mod report_routes;
pub mod server_app;
pub mod server_config;

pub use server_app::{build_router, build_server_state, run, ServerState};
pub use server_config::ServerConfig;
