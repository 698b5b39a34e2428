//! Persistence layer — per-user diagnosis sessions.

pub mod sessions;

pub use sessions::{InMemorySessionStore, SessionStore, UserGuard, UserLocks};
