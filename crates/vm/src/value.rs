//! Runtime values for the Opal VM
//!
//! Operand stacks, variable slots, and both heaps hold `Value`s. Struct and
//! array references are plain object ids (`Value::Obj`) indexing into the
//! VM's side tables; `null` is an explicit case so every runtime type check
//! can match on it directly.

use std::fmt;

/// A dynamically typed runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    /// The null reference. Unifies with any heap reference and participates
    /// only in equality comparisons.
    Null,
    /// A heap object id naming a struct or an array.
    Obj(u64),
}

impl Value {
    /// Dynamic type name used in runtime error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Obj(_) => "oid",
        }
    }

    /// True when two values have the same dynamic type (object ids count as
    /// one type regardless of what they reference).
    pub fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Canonical output text: `null`, `true`, and `false` lower-case, doubles in
/// the host's default format, strings without quotes. This is exactly what
/// `WRITE` prints.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Str(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::Obj(id) => write!(f, "{}", id),
        }
    }
}
