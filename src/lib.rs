//! tracehop is a transparent HTTP forwarding proxy.
//!
//! It accepts HTTP requests, forwards them either to the host the request
//! names or to a single configured target base URL, and streams the
//! origin's response back. Every request and response is written to
//! stdout as a readable transcript while the bytes flow through.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution.
//! - [`config`] -- Validated, read-only runtime configuration.
//! - [`error`] -- Startup and per-request error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- The forwarding pipeline: target resolution, header
//!   hygiene, transcripts, body tee, and the outbound client.
//! - [`server`] -- Axum server setup, shared application state, and
//!   graceful shutdown.

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;
