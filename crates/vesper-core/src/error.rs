use crate::value::Type;

/// Errors surfaced by the core runtime.
///
/// Only contract violations become errors. Immutability rejections are
/// reported as `bool` results from the operation that was refused, and
/// aborted traversals return partial/sentinel results instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Type error: expected {expected}, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Cannot order {lhs} against {rhs}")]
    NotComparable { lhs: Type, rhs: Type },
}

impl CoreError {
    pub fn type_error(expected: &'static str, got: &'static str) -> Self {
        CoreError::Type { expected, got }
    }

    pub fn not_comparable(lhs: Type, rhs: Type) -> Self {
        CoreError::NotComparable { lhs, rhs }
    }
}
