//! Scalar values crossing the driver boundary and the typed field bridge.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DataError, DataResult};

/// Column/parameter type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int32,
    Int64,
    Double,
    String,
    Uuid,
    DateTime,
}

impl ValueKind {
    /// Integer kinds qualify a single key for database-generated values
    pub fn is_integer(&self) -> bool {
        matches!(self, ValueKind::Int32 | ValueKind::Int64)
    }

    /// Kinds a key column may be declared with
    pub fn is_key_compatible(&self) -> bool {
        !matches!(self, ValueKind::DateTime)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Uuid => "uuid",
            ValueKind::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A single scalar read from or written to the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind of a non-null value
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int32(_) => Some(ValueKind::Int32),
            Value::Int64(_) => Some(ValueKind::Int64),
            Value::Double(_) => Some(ValueKind::Double),
            Value::String(_) => Some(ValueKind::String),
            Value::Uuid(_) => Some(ValueKind::Uuid),
            Value::DateTime(_) => Some(ValueKind::DateTime),
        }
    }

    /// Widen any integer representation to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self.kind() {
            Some(kind) => kind.to_string(),
            None => "null".to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "'{}'", v),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f64 => Double,
    String => String,
    Uuid => Uuid,
    DateTime<Utc> => DateTime,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Bridge between a Rust field type and [`Value`].
///
/// Implementations decide the column kind, whether the field is nullable,
/// the type-derived default and how a driver value converts back.
pub trait FieldValue: Sized + Send + Sync + 'static {
    const KIND: ValueKind;
    const NULLABLE: bool;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> DataResult<Self>;

    fn default_value() -> Value;
}

fn mismatch<T: FieldValue>(found: &Value) -> DataError {
    DataError::Conversion {
        property: String::new(),
        expected: T::KIND.to_string(),
        found: found.describe(),
    }
}

impl FieldValue for bool {
    const KIND: ValueKind = ValueKind::Bool;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            // tinyint(1) columns come back as integers on some drivers
            Value::Int32(v) => Ok(v != 0),
            Value::Int64(v) => Ok(v != 0),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::Bool(false)
    }
}

impl FieldValue for i32 {
    const KIND: ValueKind = ValueKind::Int32;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::Int32(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Int32(v) => Ok(v),
            Value::Int64(v) => i32::try_from(v).map_err(|_| mismatch::<Self>(&Value::Int64(v))),
            Value::Double(v) if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) => {
                Ok(v as i32)
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::Int32(0)
    }
}

impl FieldValue for i64 {
    const KIND: ValueKind = ValueKind::Int64;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::Int64(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Int32(v) => Ok(i64::from(v)),
            Value::Int64(v) => Ok(v),
            // SCOPE_IDENTITY() is numeric(38,0)
            Value::Double(v) if v.fract() == 0.0 => Ok(v as i64),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::Int64(0)
    }
}

impl FieldValue for f64 {
    const KIND: ValueKind = ValueKind::Double;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::Double(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Int32(v) => Ok(f64::from(v)),
            Value::Int64(v) => Ok(v as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::Double(0.0)
    }
}

impl FieldValue for String {
    const KIND: ValueKind = ValueKind::String;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(v) => Ok(v),
            Value::Uuid(v) => Ok(v.to_string()),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    /// An empty string stands in for a missing value and is stored as NULL
    fn default_value() -> Value {
        Value::String(String::new())
    }
}

impl FieldValue for Uuid {
    const KIND: ValueKind = ValueKind::Uuid;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Uuid(v) => Ok(v),
            Value::String(ref s) => Uuid::parse_str(s).map_err(|_| mismatch::<Self>(&value)),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::Uuid(Uuid::nil())
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::DateTime;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::String(ref s) => DateTime::parse_from_rfc3339(s)
                .map(|v| v.with_timezone(&Utc))
                .map_err(|_| mismatch::<Self>(&value)),
            other => Err(mismatch::<Self>(&other)),
        }
    }

    fn default_value() -> Value {
        Value::DateTime(DateTime::<Utc>::default())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> DataResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn default_value() -> Value {
        Value::Null
    }
}
