use std::fmt;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error codes surfaced in status lines and exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed input or bad argument.
    Invalid,
    /// Referenced entity absent.
    NotFound,
    /// Pre-existing entity with mismatched attributes, or impossible state.
    Conflict,
    /// Execution-time failure inside an otherwise-valid command.
    CommandErr,
    /// Unexpected failure.
    Internal,
    /// Items-map/Tree divergence detected.
    BadSyncState,
    /// Wraps a non-empty collection of sub-errors.
    Multiple,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::Invalid => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::CommandErr => 450,
            ErrorCode::Internal => 500,
            ErrorCode::BadSyncState => 502,
            ErrorCode::Multiple => 600,
        }
    }

    /// Fixed human-readable description, tightly bound to the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Invalid => "Invalid input",
            ErrorCode::NotFound => "Not found",
            ErrorCode::Conflict => "Conflict or impossible state",
            ErrorCode::CommandErr => "Error while executing command",
            ErrorCode::Internal => "An unknown error occurred",
            ErrorCode::BadSyncState => "Issue with World state sync detected",
            ErrorCode::Multiple => "Multiple errors",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Error value carried through the core: a code, a site-specific message, and
/// structured key/value context. May wrap inner errors; a wrapper holding more
/// than one switches to [`ErrorCode::Multiple`].
///
/// The `Display` form is the grammar's Status production
/// (`<code> error "<message>" "<key>=<value>"…`), so any rendered error
/// re-parses as a Status statement.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{}", self.status_line())]
pub struct Error {
    code: ErrorCode,
    message: String,
    data: Vec<(String, String)>,
    inner: Vec<Error>,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Error {
            code: ErrorCode::Internal,
            message: message.into(),
            data: Vec::new(),
            inner: Vec::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::Invalid)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::NotFound)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::Conflict)
    }

    pub fn command_err(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::CommandErr)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::Internal)
    }

    pub fn bad_sync_state(message: impl Into<String>) -> Self {
        Error::new(message).with_code(ErrorCode::BadSyncState)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.push((key.into(), value.into()));
        self
    }

    /// Wrap an inner error. Wrapping a second one switches this error to
    /// [`ErrorCode::Multiple`].
    pub fn wrap(mut self, err: Error) -> Self {
        self.inner.push(err);
        if self.inner.len() > 1 {
            self.code = ErrorCode::Multiple;
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &[(String, String)] {
        &self.data
    }

    pub fn inner(&self) -> &[Error] {
        &self.inner
    }

    /// The status-line rendering: `<code> error "<message>" "<k>=<v>"…`.
    ///
    /// Double quotes inside the message or data values are flattened to single
    /// quotes so the rendered line always re-parses as a Status statement.
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{} error \"{}\"",
            self.code.as_u16(),
            sanitize(&self.message)
        );
        for (key, value) in &self.data {
            line.push_str(&format!(" \"{}={}\"", sanitize(key), sanitize(value)));
        }
        line
    }
}

fn sanitize(s: &str) -> String {
    s.replace('"', "'").replace('\n', " ")
}

/// Fold a non-empty error list into one error, wrapping under
/// [`ErrorCode::Multiple`] when there is more than one.
pub fn combine(mut errs: Vec<Error>) -> Option<Error> {
    match errs.len() {
        0 => None,
        1 => Some(errs.remove(0)),
        _ => {
            let mut combined =
                Error::new("multiple errors occurred").with_code(ErrorCode::Multiple);
            for err in errs {
                combined.inner.push(err);
            }
            Some(combined)
        }
    }
}
