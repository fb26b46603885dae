//! Error types for the template crate.

use thiserror::Error;

/// Result type alias for template operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Template error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The template text is not a valid literal structure, or one of its
    /// expressions does not compile. Fatal for that template only.
    #[error("template syntax error at line {line}, column {column}: {reason}")]
    TemplateSyntax {
        line: usize,
        column: usize,
        reason: String,
    },

    /// An expression failed while projecting one record.
    #[error("cannot evaluate '{expression}': {reason}")]
    Eval { expression: String, reason: String },
}

impl Error {
    /// Create a template syntax error.
    pub fn template_syntax(line: usize, column: usize, reason: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            line,
            column,
            reason: reason.into(),
        }
    }

    /// Create an evaluation error.
    pub fn eval(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Eval {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = Error::template_syntax(3, 14, "expected ':' after key");
        let text = err.to_string();
        assert!(text.contains("line 3"));
        assert!(text.contains("column 14"));
        assert!(text.contains("expected ':'"));
    }

    #[test]
    fn test_eval_error_display() {
        let err = Error::eval("int(record.stock)", "cannot convert string 'n/a' to int");
        assert!(err.to_string().contains("int(record.stock)"));
    }
}
