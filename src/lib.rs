//! Confido: token-authenticated, per-user, per-application configuration
//! service backed by append-only revision chains and a TTL read cache.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
