//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the upload form and conversion endpoint
//! - Request handlers, including the MP3 attachment response
//! - Health, version and job counter endpoints
//! - Optional CORS middleware

pub mod handlers;
pub mod routes;

pub use routes::create_router;
