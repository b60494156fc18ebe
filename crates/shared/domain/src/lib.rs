//! Domain layer - Identity entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! The persistence mappings for these types live in `identity-store`.

pub mod constants;
pub mod error;
pub mod role;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use role::{Role, UserRole};
pub use user::{Claim, LoginInfo, User, UserClaim, UserLogin};
