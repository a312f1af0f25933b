//! phi: token-authenticated media uploads filed away by date.
//!
//! - [`auth`]: password hashing, credential store, registration, sessions
//! - [`upload`]: date-partitioned upload ingestion
//! - [`gateway`]: axum HTTP surface
//! - [`organizer`]: offline chronological sorter for existing media
//! - [`config`]: TOML + environment configuration

pub mod auth;
pub mod config;
pub mod gateway;
pub mod organizer;
pub mod upload;

pub use config::Config;
