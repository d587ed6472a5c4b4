//! Authentication state
//!
//! Handles:
//! - Current identity and profile
//! - Routing between the welcome and home screens

pub mod session;

pub use session::{Route, SessionStore};
