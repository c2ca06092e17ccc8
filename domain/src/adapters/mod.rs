//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory repositories back unit tests and the `memory` storage
//! provider. Persistent adapters (SQLite, Firestore) live in separate crates.

pub mod memory_repo;
