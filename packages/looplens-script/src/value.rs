use crate::ast::FunctionDef;
use crate::interp::Env;
use slotmap::new_key_type;
use std::fmt;
use std::rc::Rc;

new_key_type! {
    pub struct PromiseKey;
}

/// A user-defined function together with the scope it closed over.
pub struct Closure {
    pub(crate) def: Rc<FunctionDef>,
    pub(crate) env: Rc<Env>,
}

impl Closure {
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }
}

/// Built-in objects and the primitives they expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Console,
    Log,
    SetTimeout,
    QueueMicrotask,
    PromiseCtor,
    Resolve,
    /// `.then` bound to a promise.
    Then(PromiseKey),
}

impl Native {
    fn name(&self) -> &'static str {
        match self {
            Native::Console => "console",
            Native::Log => "log",
            Native::SetTimeout => "setTimeout",
            Native::QueueMicrotask => "queueMicrotask",
            Native::PromiseCtor => "Promise",
            Native::Resolve => "resolve",
            Native::Then(_) => "then",
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Function(Rc<Closure>),
    Native(Native),
    Promise(PromiseKey),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Function(_) | Value::Native(_) | Value::Promise(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Function(_) | Value::Native(_) | Value::Promise(_) => f64::NAN,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Native(Native::Console) | Value::Promise(_) => "object",
            Value::Native(_) => "function",
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a == b,
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_) | Value::Bool(_), Value::Str(_) | Value::Bool(_))
            | (Value::Str(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Renders values the way `console.log` prints them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Function(closure) => match closure.name() {
                Some(name) => write!(f, "[Function: {name}]"),
                None => f.write_str("[Function (anonymous)]"),
            },
            Value::Native(Native::Console) => f.write_str("[object console]"),
            Value::Native(native) => write!(f, "[Function: {}]", native.name()),
            Value::Promise(_) => f.write_str("Promise {}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => fmt::Display::fmt(other, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting_matches_console() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_loose_equality_coerces_numbers_and_strings() {
        let one = Value::Number(1.0);
        let text = Value::Str(Rc::from("1"));
        assert!(one.loose_equals(&text));
        assert!(!one.strict_equals(&text));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    }
}
