//! SQL generation, command execution and the storage context.

mod command;
mod command_builder;
mod command_context;
mod connection;
mod dialect;
mod entity_builder;
mod parameters;
mod provider;
mod query_builder;
mod storage_context;

pub use command::DbCommand;
pub use command_builder::DbCommandBuilder;
pub use command_context::{CommandExecution, DbCommandContext, ParameterBinder};
pub use connection::{ColumnShape, Connection, ConnectionState, Row, TransactionId};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
pub use entity_builder::DbEntityBuilder;
pub use parameters::{DbParameter, DbParameterCollection};
pub use provider::{ConnectionFactory, DbProvider, ProviderRegistry};
pub use query_builder::DbQueryBuilder;
pub use storage_context::{DbStorageContext, TransactionContext};

#[cfg(any(test, feature = "test-utils"))]
pub use connection::MockConnection;
