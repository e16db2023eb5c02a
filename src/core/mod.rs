//! core
//!
//! Process-level configuration for bbkt.
//!
//! # Modules
//!
//! - [`config`] - Configuration schema and loading
//! - [`env`] - Credential resolution from the environment and store

pub mod config;
pub mod env;
