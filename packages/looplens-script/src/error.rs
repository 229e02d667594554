use thiserror::Error;

/// Failure while parsing or evaluating a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { line: usize, message: String },
    #[error("ReferenceError: {name} is not defined (line {line})")]
    Reference { line: usize, name: String },
    #[error("TypeError: {message} (line {line})")]
    Type { line: usize, message: String },
    #[error("RangeError: maximum call depth of {limit} exceeded (line {line})")]
    CallDepth { line: usize, limit: usize },
    #[error("execution budget of {limit} steps exhausted")]
    Budget { limit: usize },
}

impl ScriptError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn type_error(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Type {
            line,
            message: message.into(),
        }
    }

    /// True when the script was rejected before anything ran.
    pub fn is_syntax(&self) -> bool {
        matches!(self, ScriptError::Syntax { .. })
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Syntax { line, .. }
            | ScriptError::Reference { line, .. }
            | ScriptError::Type { line, .. }
            | ScriptError::CallDepth { line, .. } => Some(*line),
            ScriptError::Budget { .. } => None,
        }
    }
}
