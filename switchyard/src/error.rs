//! The error taxonomy shared by every layer.

use std::{fmt::Display, sync::Arc};

pub(crate) type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where in a client round trip a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the outbound message envelope.
    NewRequest,
    /// Encoding the request into the envelope.
    Encode,
    /// Sending the message and waiting for the reply.
    Do,
    /// Decoding the reply into a response.
    Decode,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::NewRequest => "new request",
            Phase::Encode => "encode",
            Phase::Do => "do",
            Phase::Decode => "decode",
        })
    }
}

/// Everything that can go wrong while calling an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The balancer had nothing to pick from.
    #[error("no endpoints available")]
    NoEndpoints,
    /// The call's context was cancelled.
    #[error("context canceled")]
    Cancelled,
    /// The call's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The transport failed. The phase says where.
    #[error("transport error during {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: StdError,
    },
    /// A domain-level failure. It is not a transport error and is never retried.
    #[error("business failure: {0}")]
    Business(#[source] StdError),
    /// Every retry attempt failed.
    #[error(transparent)]
    Retry(#[from] RetryError),
    /// Service discovery reported an error and the endpoints were invalidated.
    #[error("service discovery failed: {0}")]
    Discovery(Arc<Error>),
    /// A propagation header could not be decoded.
    #[error("malformed {header} header: {value:?}")]
    MalformedHeader { header: &'static str, value: String },
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Shorthand for a transport failure in `phase`.
    pub fn transport(phase: Phase, source: impl Into<StdError>) -> Self {
        Error::Transport {
            phase,
            source: source.into(),
        }
    }

    /// Shorthand for a business failure.
    pub fn business(source: impl Into<StdError>) -> Self {
        Error::Business(source.into())
    }

    /// True for cancellation and deadline errors, which always propagate unchanged.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// The HTTP-like status a server binding should answer with.
    /// Business failures map to `None`: the binding decides.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::NoEndpoints => Some(503),
            Error::Cancelled => Some(499),
            Error::DeadlineExceeded => Some(504),
            Error::Transport { .. } => Some(502),
            Error::Business(_) => None,
            Error::Retry(retry) => retry.final_error().and_then(Error::status_code),
            Error::Discovery(_) => Some(503),
            Error::MalformedHeader { .. } => Some(400),
            Error::Message(_) => Some(500),
        }
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Message(message.to_string())
    }
}

/// The aggregate error of a retry loop that gave up.
#[derive(Debug)]
pub struct RetryError {
    errors: Vec<Error>,
}

impl RetryError {
    pub(crate) fn new(errors: Vec<Error>) -> Self {
        Self { errors }
    }

    /// Every attempt's error, oldest first.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The last attempt's error.
    pub fn final_error(&self) -> Option<&Error> {
        self.errors.last()
    }
}

impl Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.split_last() {
            Some((last, [])) => write!(f, "{last}"),
            Some((last, previous)) => {
                write!(f, "{last} (previously: ")?;
                for (i, error) in previous.iter().enumerate() {
                    if 0 < i {
                        f.write_str("; ")?;
                    }
                    write!(f, "{error}")?;
                }
                f.write_str(")")
            }
            None => f.write_str("retry gave up without attempts"),
        }
    }
}

impl std::error::Error for RetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.final_error()
            .map(|error| error as &(dyn std::error::Error + 'static))
    }
}
