//! # hitag-server
//!
//! HTTP server library for hitag presence tracking.
//!
//! This library provides the API handlers, logging setup and shared state used
//! by the `hitagd` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
