//! A SQL statement with its parameters and transaction enlistment.

use super::connection::TransactionId;
use super::parameters::DbParameterCollection;

/// SQL text plus bound parameters, executed by a [`Connection`](super::Connection).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbCommand {
    text: String,
    parameters: DbParameterCollection,
    transaction: Option<TransactionId>,
}

impl DbCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn parameters(&self) -> &DbParameterCollection {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut DbParameterCollection {
        &mut self.parameters
    }

    /// Transaction the command runs in; `None` runs outside any transaction
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn set_transaction(&mut self, transaction: Option<TransactionId>) {
        self.transaction = transaction;
    }

    /// Builder-style parameter binding for ad-hoc commands
    pub fn with_parameter(mut self, name: &str, value: impl Into<crate::value::Value>) -> Self {
        self.parameters.set(name, value);
        self
    }

    pub fn with_transaction(mut self, transaction: Option<TransactionId>) -> Self {
        self.transaction = transaction;
        self
    }
}
