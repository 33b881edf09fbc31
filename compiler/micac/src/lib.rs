//! Command-line driver for the Mica daemon.
//!
//! The driver is a thin client: every subcommand except `daemon` turns
//! into one request frame sent to a running daemon over a Unix socket
//! named by the status file. Exit codes mirror the server's `status`
//! field: 0 clean, 1 diagnostics, 2 configuration or discovery trouble.

pub mod cli;
pub mod client;
pub mod tracing_setup;
