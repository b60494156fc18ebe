//! Domain-level constants.
//!
//! Default table names and the validation rules applied to identity entities.

// =============================================================================
// Tables
// =============================================================================

/// Default table for [`crate::User`]
pub const USER_TABLE: &str = "User";

/// Default table for [`crate::Role`]
pub const ROLE_TABLE: &str = "Role";

/// Default table for [`crate::UserRole`]
pub const USER_ROLE_TABLE: &str = "UserRole";

/// Default table for [`crate::UserLogin`]
pub const USER_LOGIN_TABLE: &str = "UserLogin";

/// Default table for [`crate::UserClaim`]
pub const USER_CLAIM_TABLE: &str = "UserClaim";

// =============================================================================
// Validation
// =============================================================================

/// Minimum user name length requirement
pub const MIN_NAME_LENGTH: usize = 1;

/// Maximum length of user names, role names and login keys
pub const MAX_NAME_LENGTH: usize = 256;

/// Check that a name is within the allowed length after trimming
pub fn is_valid_name(name: &str) -> bool {
    let len = name.trim().chars().count();
    (MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&len)
}
