//! Identity admin - Maintenance commands over the identity stores.
//!
//! The command functions only see the store contracts, so they run the same
//! against the database-backed stores and against mocks.

pub mod commands;

pub use commands::{assign_role, create_role, create_user, list_roles, list_users, Output};
