//! User domain entity and the records hanging off it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::is_valid_name;
use crate::error::{DomainError, DomainResult};

/// User domain entity
///
/// `id` is assigned by the database on insert; a freshly created user has
/// id 0 until its unit of work has been saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i32,
    pub user_name: String,
    pub email: String,
    pub email_confirmed: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub security_stamp: String,
    pub phone_number: String,
    pub phone_number_confirmed: bool,
    pub two_factor_enabled: bool,
    /// End of the current lockout (None = not locked out)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_end_date_utc: Option<DateTime<Utc>>,
    pub lockout_enabled: bool,
    pub access_failed_count: i32,
}

impl User {
    /// Create a new user, validating the user name
    pub fn new(user_name: impl Into<String>, email: impl Into<String>) -> DomainResult<Self> {
        let user = Self {
            user_name: user_name.into(),
            email: email.into(),
            ..Self::default()
        };
        user.validate()?;
        Ok(user)
    }

    /// Check the invariants every persisted user must satisfy
    pub fn validate(&self) -> DomainResult<()> {
        if !is_valid_name(&self.user_name) {
            return Err(DomainError::validation("User name must be 1 to 256 characters"));
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(DomainError::validation(format!(
                "{} is not an email address",
                self.email
            )));
        }
        Ok(())
    }

    /// Check if the user has been assigned an id by the database
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    /// Check if the user is locked out at `now`
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_enabled && self.lockout_end_date_utc.is_some_and(|end| end > now)
    }

    /// Count a failed access attempt and return the new count
    pub fn record_failed_access(&mut self) -> i32 {
        self.access_failed_count += 1;
        self.access_failed_count
    }

    pub fn reset_access_failed_count(&mut self) {
        self.access_failed_count = 0;
    }
}

/// External login reference (provider name plus the key it issued)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginInfo {
    pub login_provider: String,
    pub provider_key: String,
}

impl LoginInfo {
    pub fn new(login_provider: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            login_provider: login_provider.into(),
            provider_key: provider_key.into(),
        }
    }
}

/// Link between a user and an external login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLogin {
    pub login_provider: String,
    pub provider_key: String,
    pub user_id: i32,
}

impl UserLogin {
    pub fn new(user_id: i32, login: &LoginInfo) -> DomainResult<Self> {
        if login.login_provider.trim().is_empty() || login.provider_key.trim().is_empty() {
            return Err(DomainError::validation(
                "Login provider and provider key are required",
            ));
        }
        Ok(Self {
            login_provider: login.login_provider.clone(),
            provider_key: login.provider_key.clone(),
            user_id,
        })
    }

    pub fn login_info(&self) -> LoginInfo {
        LoginInfo::new(&self.login_provider, &self.provider_key)
    }
}

/// Claim value object (type plus value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Claim stored against a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    pub id: i32,
    pub user_id: i32,
    pub claim_type: String,
    pub claim_value: String,
}

impl UserClaim {
    pub fn new(user_id: i32, claim: &Claim) -> DomainResult<Self> {
        if claim.claim_type.trim().is_empty() {
            return Err(DomainError::validation("Claim type is required"));
        }
        Ok(Self {
            id: 0,
            user_id,
            claim_type: claim.claim_type.clone(),
            claim_value: claim.value.clone(),
        })
    }

    pub fn claim(&self) -> Claim {
        Claim::new(&self.claim_type, &self.claim_value)
    }

    /// Check if this row stores `claim`
    pub fn matches(&self, claim: &Claim) -> bool {
        self.claim_type == claim.claim_type && self.claim_value == claim.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_user_validates_name() {
        assert!(User::new("alice", "alice@example.com").is_ok());
        assert!(matches!(User::new("  ", ""), Err(DomainError::Validation(_))));
        assert!(matches!(
            User::new("bob", "not-an-email"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_lockout_requires_enabled_flag_and_future_end() {
        let now = Utc::now();
        let mut user = User::new("alice", "").unwrap();
        user.lockout_end_date_utc = Some(now + Duration::minutes(5));
        assert!(!user.is_locked_out(now));

        user.lockout_enabled = true;
        assert!(user.is_locked_out(now));
        assert!(!user.is_locked_out(now + Duration::minutes(10)));
    }

    #[test]
    fn test_failed_access_counter() {
        let mut user = User::default();
        assert_eq!(user.record_failed_access(), 1);
        assert_eq!(user.record_failed_access(), 2);
        user.reset_access_failed_count();
        assert_eq!(user.access_failed_count, 0);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut user = User::new("alice", "").unwrap();
        user.password_hash = "hash".to_string();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("security_stamp"));
    }

    #[test]
    fn test_login_and_claim_require_identifiers() {
        assert!(UserLogin::new(1, &LoginInfo::new("", "key")).is_err());
        let login = UserLogin::new(1, &LoginInfo::new("github", "42")).unwrap();
        assert_eq!(login.login_info(), LoginInfo::new("github", "42"));

        assert!(UserClaim::new(1, &Claim::new("", "x")).is_err());
        let claim = UserClaim::new(1, &Claim::new("email", "a@b.c")).unwrap();
        assert!(claim.matches(&Claim::new("email", "a@b.c")));
    }
}
