//! Backend-for-frontend in front of the soil, objects and submissions APIs.
//!
//! The binary in `main.rs` only calls [`app::run`]; everything else lives here so
//! integration tests can assemble the router against mock upstreams.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
