use std::backtrace::Backtrace;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure category of a [`DbError`].
///
/// The set is closed: callers are expected to branch on kinds, never on
/// message text. Backend-reported failures that fit no other kind arrive as
/// [`ErrorKind::Backend`] with the backend's own code preserved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("no registered driver accepts this URL")]
    NoDriver,
    #[error("driver does not serve the requested connection family")]
    WrongFamily,
    #[error("failed to parse URL or parameter text")]
    ParseError,
    #[error("connect refused or timed out")]
    ConnectFailure,
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("statement is closed")]
    StatementClosed,
    #[error("result set or stream is closed")]
    ResultClosed,
    #[error("parameter index or value cannot be bound")]
    BindError,
    #[error("type not supported by this backend")]
    TypeNotSupported,
    #[error("column value is NULL")]
    NullValue,
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,
    #[error("illegal transaction state transition")]
    TransactionState,
    #[error("isolation level not supported by this backend")]
    IsolationUnsupported,
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,
    #[error("pool is closed")]
    PoolClosed,
    #[error("pool exhausted")]
    PoolExhausted,
    #[error("transaction id is not registered")]
    UnknownTransaction,
    #[error("connection validation probe failed")]
    ValidationFailed,
    #[error("backend error {code}")]
    Backend { code: String },
}

/// Error type carried by every fallible operation in the crate.
///
/// Each construction site supplies its own `mark`: a fixed 12-character
/// alphanumeric tag that is opaque to callers and exists solely so a single
/// log line or telemetry event can be traced back to its origin with grep.
/// The backtrace is captured on construction and is empty when the runtime
/// has backtraces disabled.
#[derive(Debug)]
pub struct DbError {
    kind: ErrorKind,
    mark: &'static str,
    message: String,
    backtrace: Backtrace,
}

impl DbError {
    pub fn new(mark: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        debug_assert!(
            mark.len() == 12 && mark.bytes().all(|b| b.is_ascii_alphanumeric()),
            "error marks are 12 alphanumeric characters"
        );
        Self {
            kind,
            mark,
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Backend-reported failure, keeping the backend's own error code.
    pub fn backend(
        mark: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(mark, ErrorKind::Backend { code: code.into() }, message)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn mark(&self) -> &'static str {
        self.mark
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Call stack captured when the error was built. Best effort: disabled
    /// builds return a placeholder with no frames.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn is(&self, kind: &ErrorKind) -> bool {
        self.kind == *kind
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.mark, self.kind, self.message)
    }
}

impl std::error::Error for DbError {}

impl PartialEq<ErrorKind> for DbError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_mark_and_message() {
        let error = DbError::new("AB12CD34EF56", ErrorKind::PoolTimeout, "waited 2000 ms");
        let text = error.to_string();
        assert!(text.starts_with("[AB12CD34EF56]"));
        assert!(text.contains("waited 2000 ms"));
        assert_eq!(*error.kind(), ErrorKind::PoolTimeout);
    }

    #[test]
    fn backend_kind_keeps_native_code() {
        let error = DbError::backend("Z9Y8X7W6V5U4", "1062", "duplicate entry");
        match error.kind() {
            ErrorKind::Backend { code } => assert_eq!(code, "1062"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn kind_comparison_ignores_message() {
        let error = DbError::new("MM00NN11OO22", ErrorKind::NoCurrentRow, "row 0");
        assert!(error.is(&ErrorKind::NoCurrentRow));
        assert_eq!(error, ErrorKind::NoCurrentRow);
    }
}
