use std::any::Any;
use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Where a rejection came from.
///
/// Everything other than [`ErrorKind::Rejected`] marks a panic that was caught
/// while running user code and turned into a rejection at that site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected explicitly, through a resolver or a returned `Err`.
    Rejected,
    /// A promise constructor panicked before resolving.
    Construction,
    /// A `map` or `flat_map` function panicked.
    Transform,
    /// A `recover` function panicked.
    Recovery,
}

/// The underlying cause carried by a [`PromiseError`].
#[derive(Debug, Error)]
pub enum Fault {
    #[error("{0}")]
    Message(String),
    #[error("panicked: {0}")]
    Panic(String),
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync + 'static>),
}

/// The error value a promise rejects with.
///
/// Cheap to clone: the cause is shared, so every failure callback registered on
/// a rejected promise sees the same fault.
///
/// ```
/// use promise_cell::{ErrorKind, PromiseError};
/// let err = PromiseError::new("uh oh");
/// assert_eq!(err.message(), "uh oh");
/// assert_eq!(err.kind(), ErrorKind::Rejected);
/// assert_eq!(err.to_string(), "uh oh");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PromiseError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Arc<Fault>,
}

impl PromiseError {
    /// Builds an error from a plain message. The cause is a synthesized
    /// [`Fault::Message`] with the same text.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::Rejected,
            cause: Arc::new(Fault::Message(message.clone())),
            message,
        }
    }

    /// Wraps an existing error; the message is taken from its `Display`.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Rejected,
            message: err.to_string(),
            cause: Arc::new(Fault::Other(Box::new(err))),
        }
    }

    /// Converts a caught panic payload into an error of the given kind.
    pub fn from_panic(kind: ErrorKind, payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        Self {
            kind,
            cause: Arc::new(Fault::Panic(message.clone())),
            message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> &Fault {
        &self.cause
    }
}

/// Runs user code, turning a panic into an error of the given kind.
pub(crate) fn attempt<R, F>(kind: ErrorKind, f: F) -> Result<R, PromiseError>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let err = PromiseError::from_panic(kind, payload);
        debug!(?kind, error = %err, "caught panic in user code");
        err
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
