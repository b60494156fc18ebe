//! Repository layer for the identity tables.
//!
//! Each repository wraps a [`data::DbRepository`] and is its own
//! unit-of-work handler, so it is always created behind an `Arc`.

mod role_repository;
mod user_claim_repository;
mod user_login_repository;
mod user_repository;
mod user_role_repository;

pub use role_repository::RoleRepository;
pub use user_claim_repository::UserClaimRepository;
pub use user_login_repository::UserLoginRepository;
pub use user_repository::UserRepository;
pub use user_role_repository::UserRoleRepository;
