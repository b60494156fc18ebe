//! [`Connection`] implementation over sea-orm's database drivers.
//!
//! Generated SQL uses `@Name` placeholders; they are rewritten to the
//! positional form of the backend (`$1` for Postgres, `?` otherwise) and the
//! parameter values are passed in placeholder order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sea_orm::{
    ColIdx, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    ExecResult, QueryResult, Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::db::{ColumnShape, Connection, ConnectionState, DbCommand, Row, TransactionId};
use crate::error::{DataError, DataResult};
use crate::value::{Value, ValueKind};

/// Quoted literals and identifiers are matched first so that an `@` inside
/// them is left alone; only the last alternative captures a parameter.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"[^"]*"|\[[^\]]*\]|`[^`]*`|@([A-Za-z_][A-Za-z0-9_]*)"#)
        .expect("placeholder pattern is valid")
});

/// Connection backed by a sea-orm `DatabaseConnection`.
pub struct SeaOrmConnection {
    url: String,
    connection: Option<DatabaseConnection>,
    transaction: Option<(TransactionId, DatabaseTransaction)>,
    next_transaction: u64,
}

impl SeaOrmConnection {
    /// Unopened connection to `url`
    pub fn new(url: &str) -> DataResult<Self> {
        if url.trim().is_empty() {
            return Err(DataError::configuration("Database URL is empty"));
        }
        Ok(Self {
            url: url.to_string(),
            connection: None,
            transaction: None,
            next_transaction: 0,
        })
    }

    fn connection(&self) -> DataResult<&DatabaseConnection> {
        self.connection
            .as_ref()
            .ok_or_else(|| DataError::connection("Connection is not open"))
    }

    fn executor(&self, command: &DbCommand) -> DataResult<Executor<'_>> {
        match command.transaction() {
            None => Ok(Executor::Connection(self.connection()?)),
            Some(requested) => match &self.transaction {
                Some((active, transaction)) if *active == requested => Ok(Executor::Transaction(transaction)),
                _ => Err(DataError::transaction(format!("{} is not active", requested))),
            },
        }
    }

    fn take_transaction(&mut self, transaction: TransactionId) -> DataResult<DatabaseTransaction> {
        match self.transaction.take() {
            Some((active, inner)) if active == transaction => Ok(inner),
            other => {
                self.transaction = other;
                Err(DataError::transaction(format!("{} is not active", transaction)))
            }
        }
    }

    fn statement(&self, command: &DbCommand) -> DataResult<Statement> {
        let backend = self.connection()?.get_database_backend();
        to_statement(backend, command)
    }
}

enum Executor<'a> {
    Connection(&'a DatabaseConnection),
    Transaction(&'a DatabaseTransaction),
}

impl Executor<'_> {
    async fn execute(&self, statement: Statement) -> Result<ExecResult, DbErr> {
        match self {
            Executor::Connection(c) => c.execute(statement).await,
            Executor::Transaction(t) => t.execute(statement).await,
        }
    }

    async fn query_one(&self, statement: Statement) -> Result<Option<QueryResult>, DbErr> {
        match self {
            Executor::Connection(c) => c.query_one(statement).await,
            Executor::Transaction(t) => t.query_one(statement).await,
        }
    }

    async fn query_all(&self, statement: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self {
            Executor::Connection(c) => c.query_all(statement).await,
            Executor::Transaction(t) => t.query_all(statement).await,
        }
    }
}

#[async_trait]
impl Connection for SeaOrmConnection {
    fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    async fn open(&mut self) -> DataResult<()> {
        if self.connection.is_some() {
            return Err(DataError::connection("Connection is already open"));
        }
        let connection = Database::connect(self.url.as_str()).await?;
        tracing::debug!(backend = ?connection.get_database_backend(), "Database connection opened");
        self.connection = Some(connection);
        Ok(())
    }

    async fn close(&mut self) -> DataResult<()> {
        if let Some((id, transaction)) = self.transaction.take() {
            tracing::warn!(transaction = %id, "Closing connection with an open transaction");
            if let Err(err) = transaction.rollback().await {
                tracing::error!("Failed to rollback transaction: {}", err);
            }
        }
        if let Some(connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }

    async fn begin_transaction(&mut self) -> DataResult<TransactionId> {
        if self.transaction.is_some() {
            return Err(DataError::transaction("Nested transactions are not supported"));
        }
        let transaction = self.connection()?.begin().await?;
        self.next_transaction += 1;
        let id = TransactionId(self.next_transaction);
        self.transaction = Some((id, transaction));
        Ok(id)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DataResult<()> {
        self.take_transaction(transaction)?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DataResult<()> {
        self.take_transaction(transaction)?.rollback().await?;
        Ok(())
    }

    async fn execute_non_query(&mut self, command: &DbCommand) -> DataResult<u64> {
        let statement = self.statement(command)?;
        let result = self.executor(command)?.execute(statement).await?;
        Ok(result.rows_affected())
    }

    async fn execute_scalar(&mut self, command: &DbCommand, kind: ValueKind) -> DataResult<Option<Value>> {
        let statement = self.statement(command)?;
        let executor = self.executor(command)?;

        if statement.db_backend == DbBackend::MySql && is_insert(command.text()) {
            let result = executor.execute(statement).await?;
            return Ok(match result.last_insert_id() {
                0 => None,
                id => Some(Value::Int64(id as i64)),
            });
        }

        match executor.query_one(statement).await? {
            Some(row) => Ok(Some(read_column(&row, 0_usize, kind)?)),
            None => Ok(None),
        }
    }

    async fn execute_reader(&mut self, command: &DbCommand, columns: &[ColumnShape]) -> DataResult<Vec<Row>> {
        let statement = self.statement(command)?;
        let results = self.executor(command)?.query_all(statement).await?;
        results
            .iter()
            .map(|result| {
                let mut row = Row::new();
                for column in columns {
                    row.push(column.name.clone(), read_column(result, column.name.as_str(), column.kind)?);
                }
                Ok(row)
            })
            .collect()
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("insert"))
}

/// Rewrite `@Name` placeholders and collect the values in placeholder order
fn to_statement(backend: DbBackend, command: &DbCommand) -> DataResult<Statement> {
    let parameters = command.parameters();
    let mut values = Vec::new();
    let mut missing = Vec::new();

    let sql = PLACEHOLDER.replace_all(command.text(), |caps: &Captures| {
        let Some(name) = caps.get(1) else {
            return caps[0].to_string();
        };
        match parameters.get(name.as_str()) {
            Some(parameter) => values.push(to_sea_value(parameter.value(), parameter.kind())),
            None => missing.push(name.as_str().to_string()),
        }
        match backend {
            DbBackend::Postgres => format!("${}", values.len()),
            _ => "?".to_string(),
        }
    });

    if !missing.is_empty() {
        return Err(DataError::argument(format!(
            "No value bound for parameters: {}",
            missing.join(", ")
        )));
    }
    Ok(Statement::from_sql_and_values(backend, sql.into_owned(), values))
}

fn to_sea_value(value: &Value, kind: Option<ValueKind>) -> sea_orm::Value {
    match value {
        Value::Bool(v) => sea_orm::Value::from(*v),
        Value::Int32(v) => sea_orm::Value::from(*v),
        Value::Int64(v) => sea_orm::Value::from(*v),
        Value::Double(v) => sea_orm::Value::from(*v),
        Value::String(v) => sea_orm::Value::from(v.clone()),
        Value::Uuid(v) => sea_orm::Value::from(*v),
        Value::DateTime(v) => sea_orm::Value::from(*v),
        Value::Null => match kind {
            Some(ValueKind::Bool) => sea_orm::Value::from(None::<bool>),
            Some(ValueKind::Int32) => sea_orm::Value::from(None::<i32>),
            Some(ValueKind::Int64) => sea_orm::Value::from(None::<i64>),
            Some(ValueKind::Double) => sea_orm::Value::from(None::<f64>),
            Some(ValueKind::Uuid) => sea_orm::Value::from(None::<Uuid>),
            Some(ValueKind::DateTime) => sea_orm::Value::from(None::<DateTime<Utc>>),
            Some(ValueKind::String) | None => sea_orm::Value::from(None::<String>),
        },
    }
}

fn read_column<I: ColIdx>(row: &QueryResult, index: I, kind: ValueKind) -> DataResult<Value> {
    let value = match kind {
        ValueKind::Bool => Value::from(row.try_get_by::<Option<bool>, _>(index)?),
        ValueKind::Int32 => Value::from(row.try_get_by::<Option<i32>, _>(index)?),
        ValueKind::Int64 => Value::from(row.try_get_by::<Option<i64>, _>(index)?),
        ValueKind::Double => Value::from(row.try_get_by::<Option<f64>, _>(index)?),
        ValueKind::String => Value::from(row.try_get_by::<Option<String>, _>(index)?),
        ValueKind::Uuid => Value::from(row.try_get_by::<Option<Uuid>, _>(index)?),
        ValueKind::DateTime => Value::from(row.try_get_by::<Option<DateTime<Utc>>, _>(index)?),
    };
    Ok(value)
}
