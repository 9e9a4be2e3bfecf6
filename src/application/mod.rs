//! Application services: token authority, versioned config store, cache.

pub mod cache;
pub mod error;
pub mod repos;
pub mod revisions;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;
