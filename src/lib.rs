//! bbkt - Bitbucket Cloud from the command line
//!
//! bbkt manages one Bitbucket credential per user and sends authenticated
//! REST requests with it. Credentials are either static secrets (API tokens,
//! app passwords) or OAuth grants obtained through the browser and refreshed
//! automatically.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, wires components)
//! - [`auth`] - Credential model, storage, OAuth flow, and refresh
//! - [`client`] - Authenticated request execution and JSON helpers
//! - [`core`] - Configuration and environment credential resolution
//! - [`ui`] - Output formatting
//!
//! # Invariants
//!
//! 1. Secrets never appear in logs, errors, or debug output
//! 2. Concurrent requests against an expired token cause one refresh
//! 3. A rejected request is retried at most once, after a refresh
//! 4. The credential file is replaced atomically and readable only by its owner

pub mod auth;
pub mod cli;
pub mod client;
pub mod core;
pub mod ui;
