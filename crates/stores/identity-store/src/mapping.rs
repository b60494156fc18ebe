//! Table mappings for the identity entities.
//!
//! Property names double as default column names and as parameter names in
//! generated SQL. Deployments with other table names rename them through
//! [`MappingOverrides`] instead of new mapping types.

use data::{
    DataResult, EntityConfiguration, EntityConfigurationBuilder, EntityConfigurationCollection,
    EntityTypeConfiguration, MappingOverrides,
};
use domain::{
    Role, User, UserClaim, UserLogin, UserRole, ROLE_TABLE, USER_CLAIM_TABLE, USER_LOGIN_TABLE,
    USER_ROLE_TABLE, USER_TABLE,
};

pub struct UserConfiguration;

impl EntityTypeConfiguration<User> for UserConfiguration {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<User>) -> DataResult<()> {
        builder.to_table(USER_TABLE);
        builder.has_key_property("Id", |u| &u.id, |u| &mut u.id)?;
        builder.property("UserName", |u| &u.user_name, |u| &mut u.user_name);
        builder.property("Email", |u| &u.email, |u| &mut u.email);
        builder.property("EmailConfirmed", |u| &u.email_confirmed, |u| &mut u.email_confirmed);
        builder.property("PasswordHash", |u| &u.password_hash, |u| &mut u.password_hash);
        builder.property("SecurityStamp", |u| &u.security_stamp, |u| &mut u.security_stamp);
        builder.property("PhoneNumber", |u| &u.phone_number, |u| &mut u.phone_number);
        builder.property(
            "PhoneNumberConfirmed",
            |u| &u.phone_number_confirmed,
            |u| &mut u.phone_number_confirmed,
        );
        builder.property("TwoFactorEnabled", |u| &u.two_factor_enabled, |u| &mut u.two_factor_enabled);
        builder.property(
            "LockoutEndDateUtc",
            |u| &u.lockout_end_date_utc,
            |u| &mut u.lockout_end_date_utc,
        );
        builder.property("LockoutEnabled", |u| &u.lockout_enabled, |u| &mut u.lockout_enabled);
        builder.property(
            "AccessFailedCount",
            |u| &u.access_failed_count,
            |u| &mut u.access_failed_count,
        );
        Ok(())
    }
}

pub struct RoleConfiguration;

impl EntityTypeConfiguration<Role> for RoleConfiguration {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<Role>) -> DataResult<()> {
        builder.to_table(ROLE_TABLE);
        builder.has_key_property("Id", |r| &r.id, |r| &mut r.id)?;
        builder.property("Name", |r| &r.name, |r| &mut r.name);
        Ok(())
    }
}

pub struct UserRoleConfiguration;

impl EntityTypeConfiguration<UserRole> for UserRoleConfiguration {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<UserRole>) -> DataResult<()> {
        builder.to_table(USER_ROLE_TABLE);
        builder.property("UserId", |ur| &ur.user_id, |ur| &mut ur.user_id);
        builder.property("RoleId", |ur| &ur.role_id, |ur| &mut ur.role_id);
        builder.has_key(&["UserId", "RoleId"])?;
        Ok(())
    }
}

pub struct UserLoginConfiguration;

impl EntityTypeConfiguration<UserLogin> for UserLoginConfiguration {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<UserLogin>) -> DataResult<()> {
        builder.to_table(USER_LOGIN_TABLE);
        builder.property("LoginProvider", |l| &l.login_provider, |l| &mut l.login_provider);
        builder.property("ProviderKey", |l| &l.provider_key, |l| &mut l.provider_key);
        builder.property("UserId", |l| &l.user_id, |l| &mut l.user_id);
        builder.has_key(&["LoginProvider", "ProviderKey", "UserId"])?;
        Ok(())
    }
}

pub struct UserClaimConfiguration;

impl EntityTypeConfiguration<UserClaim> for UserClaimConfiguration {
    fn configure(&self, builder: &mut EntityConfigurationBuilder<UserClaim>) -> DataResult<()> {
        builder.to_table(USER_CLAIM_TABLE);
        builder.has_key_property("Id", |c| &c.id, |c| &mut c.id)?;
        builder.property("UserId", |c| &c.user_id, |c| &mut c.user_id);
        builder.property("ClaimType", |c| &c.claim_type, |c| &mut c.claim_type);
        builder.property("ClaimValue", |c| &c.claim_value, |c| &mut c.claim_value);
        Ok(())
    }
}

/// Build every identity mapping, applying `overrides` after each configure pass
pub fn configurations(overrides: &MappingOverrides) -> DataResult<EntityConfigurationCollection> {
    let mut collection = EntityConfigurationCollection::new();
    collection
        .register(EntityConfiguration::build_with_overrides(&UserConfiguration, overrides)?)?
        .register(EntityConfiguration::build_with_overrides(&RoleConfiguration, overrides)?)?
        .register(EntityConfiguration::build_with_overrides(&UserRoleConfiguration, overrides)?)?
        .register(EntityConfiguration::build_with_overrides(&UserLoginConfiguration, overrides)?)?
        .register(EntityConfiguration::build_with_overrides(&UserClaimConfiguration, overrides)?)?;
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_entity_is_registered() {
        let collection = configurations(&MappingOverrides::new()).unwrap();
        assert_eq!(
            collection.entity_names(),
            &["User", "Role", "UserRole", "UserLogin", "UserClaim"]
        );
    }

    #[test]
    fn test_keys() {
        let collection = configurations(&MappingOverrides::new()).unwrap();

        let user = collection.get::<User>().unwrap();
        assert_eq!(user.generated_key().map(|p| p.name()), Some("Id"));

        let login = collection.get::<UserLogin>().unwrap();
        let keys: Vec<&str> = login.key_property_configurations().iter().map(|p| p.name()).collect();
        assert_eq!(keys, vec!["LoginProvider", "ProviderKey", "UserId"]);
        assert!(login.generated_key().is_none());
    }

    #[test]
    fn test_table_overrides_apply() {
        let overrides = MappingOverrides::new().table("User", "AspNetUsers");
        let collection = configurations(&overrides).unwrap();

        assert_eq!(collection.get::<User>().unwrap().table_name(), "AspNetUsers");
        assert_eq!(collection.get::<Role>().unwrap().table_name(), "Role");
    }
}
