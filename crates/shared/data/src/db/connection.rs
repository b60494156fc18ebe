//! Driver-facing contract: the native connection and the rows it returns.

use async_trait::async_trait;

use crate::error::DataResult;
use crate::value::{Value, ValueKind};

use super::command::DbCommand;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Physical connection state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Handle of a transaction begun on a [`Connection`].
///
/// Commands carry the handle of the transaction they must run in, so the
/// enlistment is explicit instead of implied by connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Column a reader is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
}

impl ColumnShape {
    pub fn new(name: impl Into<String>, kind: ValueKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

/// One result row: ordered column name/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Column value by name; exact match first, then case-insensitive
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
            })
            .map(|(_, value)| value)
    }

    /// Column value by position
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Native database connection supplied by a backend.
///
/// Implementations run each command inside the transaction named by
/// [`DbCommand::transaction`], or outside any transaction when it is `None`.
/// Nested transactions are not required to be supported.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Connection: Send {
    fn state(&self) -> ConnectionState;

    async fn open(&mut self) -> DataResult<()>;

    async fn close(&mut self) -> DataResult<()>;

    async fn begin_transaction(&mut self) -> DataResult<TransactionId>;

    async fn commit(&mut self, transaction: TransactionId) -> DataResult<()>;

    async fn rollback(&mut self, transaction: TransactionId) -> DataResult<()>;

    /// Run a statement and return the affected row count
    async fn execute_non_query(&mut self, command: &DbCommand) -> DataResult<u64>;

    /// Run a statement and return the first column of the first row, if any
    async fn execute_scalar(&mut self, command: &DbCommand, kind: ValueKind) -> DataResult<Option<Value>>;

    /// Run a query and decode every row into the requested columns
    async fn execute_reader(&mut self, command: &DbCommand, columns: &[ColumnShape]) -> DataResult<Vec<Row>>;
}
