//! # QCFlow Common Library
//!
//! Shared code for the QCFlow quality-control service:
//! - Error and result types
//! - Bootstrap configuration loading
//! - Database initialization (schema, pragmas)
//! - Event types and the EventBus used for SSE
//! - Roles and the static permission table
//! - Input validation helpers for lab and production measurements

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod password;
pub mod roles;
pub mod sse;
pub mod validation;

pub use error::{Error, Result};
pub use roles::{has_permission, Permission, Role};
