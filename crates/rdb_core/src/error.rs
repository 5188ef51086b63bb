use thiserror::Error;

/// Database operation errors.
///
/// Every fallible operation in this crate returns this error type so
/// callers can match on a stable, closed set of failure kinds rather than
/// parse message text.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or re-establish a connection.
    #[error("connection failed during {phase} (role: {role}): {source}")]
    ConnectionFailed {
        phase: &'static str,
        role: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation is not valid given the current state of the context,
    /// connection or transaction (e.g. committing twice).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The context, connection or gateway has already been disposed.
    #[error("object has been disposed")]
    ObjectDisposed,

    /// The dialect or provider does not implement the requested capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A required argument was null/None where a value was required.
    #[error("argument must not be null: {0}")]
    ArgumentNull(String),

    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The parameter bag exceeded the provider's bind-parameter limit.
    #[error("too many parameters: limit {limit}, got {actual}")]
    TooManyParameters { limit: usize, actual: usize },

    /// A value read back from the provider could not be coerced into the
    /// target column type.
    #[error("invalid value for column {column:?} at row {row_index}: {source}")]
    InvalidValue {
        column: String,
        row_index: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation exceeded its configured timeout.
    #[error("operation timed out")]
    Timeout,
}

impl DbError {
    pub fn connection_failed(
        phase: &'static str,
        role: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            phase,
            role,
            source: Box::new(source),
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn argument_null(arg: impl Into<String>) -> Self {
        Self::ArgumentNull(arg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_value(
        column: impl Into<String>,
        row_index: usize,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::InvalidValue {
            column: column.into(),
            row_index,
            source: Box::new(source),
        }
    }

    /// Whether retrying the same operation stands a reasonable chance of
    /// succeeding (transient connection loss, timeout) as opposed to a
    /// deterministic failure (bad argument, unsupported capability).
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn connection_failed_is_retriable() {
        let err = DbError::connection_failed(
            "open",
            "writer",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(err.is_retriable());
    }

    #[test]
    fn invalid_argument_is_not_retriable() {
        assert!(!DbError::invalid_argument("bad").is_retriable());
    }

    #[test]
    fn too_many_parameters_display_includes_counts() {
        let err = DbError::TooManyParameters {
            limit: 2100,
            actual: 2101,
        };
        assert_eq!(err.to_string(), "too many parameters: limit 2100, got 2101");
    }
}
