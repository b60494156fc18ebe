//! Identity store - Users, roles, logins and claims persisted through the data engine.
//!
//! This crate provides:
//! - Entity mappings for the identity tables (`mapping`)
//! - Repositories with the finders the stores need (`repository`)
//! - Store contracts and their implementations (`store`)
//! - `IdentityDataContext`, which wires one connection, one unit of work and
//!   the repositories together

pub mod context;
pub mod mapping;
pub mod repository;
pub mod store;

pub use context::IdentityDataContext;
pub use store::{
    IdentityRoleStore, IdentityUserStore, RoleStore, UserClaimStore, UserLockoutStore,
    UserLoginStore, UserRoleStore, UserStore, UserTwoFactorStore,
};
