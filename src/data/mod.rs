//! Data layer module
//!
//! Typed rows for the hosted tables: users, posts, postLikes, comments,
//! notifications. Authoritative storage is remote; these are the client's
//! view of it.

mod models;

pub use models::*;
