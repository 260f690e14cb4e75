//! Built-in function registry
//!
//! The set is closed: a name that does not map to a [`Builtin`] variant is
//! rejected with `UnknownFunction` before any argument is evaluated.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Accepted argument counts for a built-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }

    fn describe(&self) -> String {
        match self {
            Arity::Exact(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {}", n),
        }
    }
}

/// Functions callable from transformation expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Split,
    Concat,
    DateFormat,
    Join,
    Lower,
    Upper,
    Trim,
    Coalesce,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Split,
        Builtin::Concat,
        Builtin::DateFormat,
        Builtin::Join,
        Builtin::Lower,
        Builtin::Upper,
        Builtin::Trim,
        Builtin::Coalesce,
    ];

    /// Resolve a function name
    pub fn lookup(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|builtin| builtin.name() == name)
            .ok_or_else(|| SchemaError::UnknownFunction(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Split => "split",
            Builtin::Concat => "concat",
            Builtin::DateFormat => "date_format",
            Builtin::Join => "join",
            Builtin::Lower => "lower",
            Builtin::Upper => "upper",
            Builtin::Trim => "trim",
            Builtin::Coalesce => "coalesce",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Builtin::Split | Builtin::DateFormat | Builtin::Join => Arity::Exact(2),
            Builtin::Concat => Arity::AtLeast(2),
            Builtin::Lower | Builtin::Upper | Builtin::Trim => Arity::Exact(1),
            Builtin::Coalesce => Arity::AtLeast(1),
        }
    }

    pub fn check_arity(&self, found: usize) -> Result<()> {
        let arity = self.arity();
        if arity.accepts(found) {
            Ok(())
        } else {
            Err(SchemaError::ArityMismatch {
                function: self.name().to_string(),
                expected: arity.describe(),
                found,
            })
        }
    }

    /// Call with already-evaluated arguments.
    ///
    /// Unresolved (`null`) arguments make the result unresolved, except for
    /// `coalesce` which exists to pick past them.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        self.check_arity(args.len())?;

        if *self != Builtin::Coalesce && args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }

        match self {
            Builtin::Split => {
                let text = self.text_arg(args, 0)?;
                let delimiter = self.text_arg(args, 1)?;
                if delimiter.is_empty() {
                    return Err(self.invalid("delimiter must not be empty"));
                }
                Ok(Value::Array(
                    text.split(delimiter)
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ))
            }
            Builtin::Concat => {
                let mut out = String::new();
                for (i, arg) in args.iter().enumerate() {
                    out.push_str(&self.scalar_text(arg, i)?);
                }
                Ok(Value::String(out))
            }
            Builtin::DateFormat => {
                let pattern = self.text_arg(args, 1)?;
                self.date_format(&args[0], pattern)
            }
            Builtin::Join => {
                let items = args[0].as_array().ok_or_else(|| {
                    self.invalid(format!("argument 1 must be an array, got {}", kind(&args[0])))
                })?;
                let delimiter = self.text_arg(args, 1)?;
                let parts = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.scalar_text(item, i))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::String(parts.join(delimiter)))
            }
            Builtin::Lower => Ok(Value::String(self.text_arg(args, 0)?.to_lowercase())),
            Builtin::Upper => Ok(Value::String(self.text_arg(args, 0)?.to_uppercase())),
            Builtin::Trim => Ok(Value::String(self.text_arg(args, 0)?.trim().to_string())),
            Builtin::Coalesce => Ok(args
                .iter()
                .find(|arg| !arg.is_null())
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }

    fn date_format(&self, value: &Value, pattern: &str) -> Result<Value> {
        let timestamp = self.parse_timestamp(value)?;

        let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(self.invalid(format!("invalid date pattern '{}'", pattern)));
        }

        let mut out = String::new();
        write!(out, "{}", timestamp.format_with_items(items.iter()))
            .map_err(|_| self.invalid(format!("cannot render date pattern '{}'", pattern)))?;
        Ok(Value::String(out))
    }

    fn parse_timestamp(&self, value: &Value) -> Result<DateTime<Utc>> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .ok_or_else(|| self.invalid(format!("timestamp {} out of range", n))),
            Value::String(text) => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                    return Ok(parsed.with_timezone(&Utc));
                }
                for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, layout) {
                        return Ok(parsed.and_utc());
                    }
                }
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|midnight| midnight.and_utc())
                    .ok_or_else(|| self.invalid(format!("unrecognised date '{}'", text)))
            }
            other => Err(self.invalid(format!(
                "argument 1 must be a date string or unix timestamp, got {}",
                kind(other)
            ))),
        }
    }

    fn text_arg<'a>(&self, args: &'a [Value], index: usize) -> Result<&'a str> {
        args[index].as_str().ok_or_else(|| {
            self.invalid(format!(
                "argument {} must be a string, got {}",
                index + 1,
                kind(&args[index])
            ))
        })
    }

    fn scalar_text(&self, value: &Value, index: usize) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(self.invalid(format!(
                "element {} must be a scalar, got {}",
                index + 1,
                kind(other)
            ))),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::InvalidArgument {
            function: self.name().to_string(),
            message: message.into(),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
