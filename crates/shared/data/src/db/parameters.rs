//! Name-indexed parameter collection attached to a command.

use std::collections::HashMap;

use crate::value::{Value, ValueKind};

/// A bound parameter. `kind` lets drivers type a NULL correctly.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    name: String,
    value: Value,
    kind: Option<ValueKind>,
}

impl DbParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Declared kind, falling back to the kind of the current value
    pub fn kind(&self) -> Option<ValueKind> {
        self.kind.or_else(|| self.value.kind())
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.value = value.into();
        self
    }

    pub fn set_kind(&mut self, kind: ValueKind) -> &mut Self {
        self.kind = Some(kind);
        self
    }
}

/// Parameters in first-added order, addressable by name.
///
/// Looking up an unknown name through [`get_or_add`](Self::get_or_add)
/// creates the parameter, so per-entity rebinding can simply overwrite.
/// Names are stored without a leading marker (`@Id` and `Id` are the same).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbParameterCollection {
    parameters: Vec<DbParameter>,
    index: HashMap<String, usize>,
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$', '?'])
}

impl DbParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing parameter, or a new NULL one appended under `name`
    pub fn get_or_add(&mut self, name: &str) -> &mut DbParameter {
        let name = normalize(name);
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => {
                self.parameters.push(DbParameter {
                    name: name.to_string(),
                    value: Value::Null,
                    kind: None,
                });
                let position = self.parameters.len() - 1;
                self.index.insert(name.to_string(), position);
                position
            }
        };
        &mut self.parameters[position]
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.get_or_add(name).set_value(value);
        self
    }

    pub fn set_typed(&mut self, name: &str, value: impl Into<Value>, kind: ValueKind) -> &mut Self {
        self.get_or_add(name).set_value(value).set_kind(kind);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DbParameter> {
        self.index
            .get(normalize(name))
            .map(|&position| &self.parameters[position])
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(DbParameter::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(normalize(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DbParameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
        self.index.clear();
    }
}

impl<'a> IntoIterator for &'a DbParameterCollection {
    type Item = &'a DbParameter;
    type IntoIter = std::slice::Iter<'a, DbParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_add_creates_once() {
        let mut params = DbParameterCollection::new();
        params.get_or_add("@UserName").set_value("alice");
        params.get_or_add("UserName").set_value("bob");

        assert_eq!(params.len(), 1);
        assert_eq!(params.value("@UserName"), Some(&Value::String("bob".to_string())));
    }

    #[test]
    fn test_order_is_first_added() {
        let mut params = DbParameterCollection::new();
        params.set("B", 2).set("A", 1).set("B", 3);

        let names: Vec<_> = params.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_typed_null_keeps_kind() {
        let mut params = DbParameterCollection::new();
        params.set_typed("Email", Value::Null, ValueKind::String);

        let param = params.get("Email").unwrap();
        assert!(param.value().is_null());
        assert_eq!(param.kind(), Some(ValueKind::String));
        assert!(!params.contains("Missing"));
    }
}
