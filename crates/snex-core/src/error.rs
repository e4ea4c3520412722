//! Error types for type resolution, function calls and compilation.

use thiserror::Error;

/// Errors raised by the type system and by direct function calls.
///
/// These are programming errors on the caller's side (finalizing a layout
/// twice, calling an unresolved function). They are reported as values so
/// that release builds never continue with a corrupted layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The layout of a complex type was already computed.
    #[error("type '{0}' is already finalised")]
    AlreadyFinalised(String),

    /// The layout is required but was never computed.
    #[error("type '{0}' is not finalised")]
    NotFinalised(String),

    /// A member with this name already exists.
    #[error("duplicate member '{member}' in type '{type_name}'")]
    DuplicateMember {
        /// Name of the aggregate type.
        type_name: String,
        /// Name of the duplicated member.
        member: String,
    },

    /// A byte offset lies outside the instance memory.
    #[error("offset {offset} exceeds memory size {size}")]
    OutOfBounds {
        /// Requested byte offset.
        offset: usize,
        /// Size of the memory block.
        size: usize,
    },

    /// The value cannot be stored in memory of this type.
    #[error("can't store {value} as {target}")]
    InvalidStore {
        /// Textual form of the value.
        value: String,
        /// Target type name.
        target: String,
    },

    /// The function has neither a function pointer nor an inliner.
    #[error("function '{0}' is not resolved")]
    UnresolvedFunction(String),

    /// The function pointer kind does not match the requested call.
    #[error("function '{0}' can't be called this way")]
    InvalidCall(String),

    /// Wrong number of arguments.
    #[error("expected {expected} arguments, got {actual}")]
    WrongArgumentCount {
        /// Number of declared arguments.
        expected: usize,
        /// Number of provided arguments.
        actual: usize,
    },
}

/// Errors raised by overload resolution.
///
/// Resolution never guesses: anything but exactly one exact match is an
/// error for the compiler front end to report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No function with this id is registered.
    #[error("can't find function '{0}'")]
    NotFound(String),

    /// Functions with this id exist, but none accepts these argument types.
    #[error("no matching overload for {symbol}({args})")]
    NoMatch {
        /// Symbol that was looked up.
        symbol: String,
        /// Comma-separated argument types.
        args: String,
    },

    /// More than one function accepts these argument types.
    #[error("ambiguous call to {symbol}: {candidates} candidates")]
    Ambiguous {
        /// Symbol that was looked up.
        symbol: String,
        /// Number of matching candidates.
        candidates: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_error_display() {
        let err = TypeError::AlreadyFinalised("Gain".into());
        assert_eq!(err.to_string(), "type 'Gain' is already finalised");

        let err = TypeError::WrongArgumentCount {
            expected: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn resolve_error_display() {
        let err = ResolveError::NoMatch {
            symbol: "f".into(),
            args: "float".into(),
        };
        assert_eq!(err.to_string(), "no matching overload for f(float)");
    }
}
