//! In-memory connection for tests.
//!
//! [`FakeDatabase`] records every statement it is asked to run, keeps the
//! statements of an open transaction apart from committed ones, and can be
//! scripted with scalar results, result sets and failures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::db::{ColumnShape, Connection, ConnectionState, DbCommand, DbParameterCollection, Row, TransactionId};
use crate::error::{DataError, DataResult};
use crate::value::{Value, ValueKind};

/// A statement the fake connection executed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub sql: String,
    pub parameters: DbParameterCollection,
    pub transaction: Option<TransactionId>,
}

impl ExecutedCommand {
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.value(name)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    open: bool,
    next_transaction: u64,
    active: Option<TransactionId>,
    executed: Vec<ExecutedCommand>,
    staged: Vec<ExecutedCommand>,
    committed: Vec<ExecutedCommand>,
    scalars: VecDeque<Option<Value>>,
    result_sets: VecDeque<Vec<Row>>,
    fail_on: Vec<String>,
    opens: usize,
    closes: usize,
    commits: usize,
    rollbacks: usize,
}

/// Shared state behind any number of [`FakeConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> FakeConnection {
        FakeConnection {
            state: Arc::clone(&self.state),
        }
    }

    pub fn boxed_connection(&self) -> Box<dyn Connection> {
        Box::new(self.connection())
    }

    /// Next scalar result; scalars past the script return `None`
    pub fn push_scalar(&self, value: impl Into<Value>) {
        self.lock().scalars.push_back(Some(value.into()));
    }

    /// Script a scalar query that returns no row
    pub fn push_empty_scalar(&self) {
        self.lock().scalars.push_back(None);
    }

    /// Next result set; readers past the script return no rows
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.lock().result_sets.push_back(rows);
    }

    /// Fail every statement whose SQL contains `fragment`
    pub fn fail_when(&self, fragment: impl Into<String>) {
        self.lock().fail_on.push(fragment.into());
    }

    /// Every statement executed, committed or not
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.lock().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.lock().executed.iter().map(|c| c.sql.clone()).collect()
    }

    /// Statements that are durable: run outside a transaction or committed
    pub fn committed(&self) -> Vec<ExecutedCommand> {
        self.lock().committed.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn active_transaction(&self) -> Option<TransactionId> {
        self.lock().active
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn rollback_count(&self) -> usize {
        self.lock().rollbacks
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Connection`] over a [`FakeDatabase`].
#[derive(Debug, Clone)]
pub struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, command: &DbCommand) -> DataResult<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(DataError::connection("Connection is not open"));
        }
        if let Some(transaction) = command.transaction() {
            if state.active != Some(transaction) {
                return Err(DataError::transaction(format!("{} is not active", transaction)));
            }
        }
        if let Some(fragment) = state.fail_on.iter().find(|f| command.text().contains(f.as_str())) {
            return Err(DataError::driver(format!("injected failure on '{}'", fragment)));
        }

        let executed = ExecutedCommand {
            sql: command.text().to_string(),
            parameters: command.parameters().clone(),
            transaction: command.transaction(),
        };
        state.executed.push(executed.clone());
        if executed.transaction.is_some() {
            state.staged.push(executed);
        } else {
            state.committed.push(executed);
        }
        Ok(())
    }

    fn end_transaction(&self, transaction: TransactionId, commit: bool) -> DataResult<()> {
        let mut state = self.lock();
        if state.active != Some(transaction) {
            return Err(DataError::transaction(format!("{} is not active", transaction)));
        }
        state.active = None;
        let staged = std::mem::take(&mut state.staged);
        if commit {
            state.commits += 1;
            state.committed.extend(staged);
        } else {
            state.rollbacks += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn state(&self) -> ConnectionState {
        if self.lock().open {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    async fn open(&mut self) -> DataResult<()> {
        let mut state = self.lock();
        if state.open {
            return Err(DataError::connection("Connection is already open"));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    async fn close(&mut self) -> DataResult<()> {
        let mut state = self.lock();
        if state.active.take().is_some() {
            state.staged.clear();
            state.rollbacks += 1;
        }
        state.open = false;
        state.closes += 1;
        Ok(())
    }

    async fn begin_transaction(&mut self) -> DataResult<TransactionId> {
        let mut state = self.lock();
        if !state.open {
            return Err(DataError::connection("Connection is not open"));
        }
        if state.active.is_some() {
            return Err(DataError::transaction("Nested transactions are not supported"));
        }
        state.next_transaction += 1;
        let transaction = TransactionId(state.next_transaction);
        state.active = Some(transaction);
        Ok(transaction)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DataResult<()> {
        self.end_transaction(transaction, true)
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DataResult<()> {
        self.end_transaction(transaction, false)
    }

    async fn execute_non_query(&mut self, command: &DbCommand) -> DataResult<u64> {
        self.run(command)?;
        Ok(1)
    }

    async fn execute_scalar(&mut self, command: &DbCommand, _kind: ValueKind) -> DataResult<Option<Value>> {
        self.run(command)?;
        Ok(self.lock().scalars.pop_front().flatten())
    }

    async fn execute_reader(&mut self, command: &DbCommand, _columns: &[ColumnShape]) -> DataResult<Vec<Row>> {
        self.run(command)?;
        Ok(self.lock().result_sets.pop_front().unwrap_or_default())
    }
}
