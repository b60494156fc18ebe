//! Identity admin - command line maintenance for the identity store.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use common::{telemetry, DatabaseConfig, StoreConfig};
use data::ProviderRegistry;
use identity_admin::commands;
use identity_store::{IdentityDataContext, IdentityRoleStore, IdentityUserStore};

#[derive(Parser)]
#[command(name = "identity-admin")]
#[command(about = "Manage users and roles in the identity store")]
struct Cli {
    /// Log SQL and transaction events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Create a role
    CreateRole {
        #[arg(long)]
        name: String,
    },
    /// Add a user to a role
    AssignRole {
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: String,
    },
    /// List role names, optionally only those of one user
    ListRoles {
        #[arg(long)]
        user: Option<String>,
    },
    /// List users
    ListUsers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose);

    let database = DatabaseConfig::from_env()?;
    let store = StoreConfig::from_env()?;
    let registry = ProviderRegistry::with_defaults();
    tracing::debug!(?database, providers = ?registry.names(), "Configuration loaded");

    let context = Arc::new(IdentityDataContext::from_config(&registry, &database, &store)?);
    let users = IdentityUserStore::new(Arc::clone(&context), store.auto_save_changes);
    let roles = IdentityRoleStore::new(Arc::clone(&context), store.auto_save_changes);

    let result = match cli.command {
        Commands::CreateUser { name, email } => commands::create_user(&users, &name, &email).await,
        Commands::CreateRole { name } => commands::create_role(&roles, &name).await,
        Commands::AssignRole { user, role } => {
            commands::assign_role(&users, &users, &user, &role).await
        }
        Commands::ListRoles { user } => {
            commands::list_roles(&users, &roles, &users, user.as_deref()).await
        }
        Commands::ListUsers => commands::list_users(&users).await,
    };

    // Mutations registered while auto-save is off are flushed once at the end
    let result = match result {
        Ok(output) if !store.auto_save_changes => users.save_changes().await.map(|_| output),
        other => other,
    };
    context.dispose().await?;

    let output = result.map_err(|err| {
        tracing::error!(code = err.code(), "{}", err);
        err
    })?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
