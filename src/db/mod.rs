//! Database module: view models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: row slices and patch structs returned to / accepted from callers.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `repost_watch::db` — we re-export
//! the repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{FoundRequest, RequestPatch, RequestWithLinks};
