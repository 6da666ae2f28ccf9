//! `Tasklist` API server library.
//!
//! Exposes the router and configuration for use in tests and embedding.
//! The server maps JSON requests onto the task facade, one identity per
//! request.

pub mod api;
pub mod config;
