//! # rentease-store
//!
//! SQLite-backed system of record for the RentEase chat.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for messages, the per-user
//! conversation list, and the user directory the conversation list resolves
//! names against.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
