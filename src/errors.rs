use thiserror::Error;

/// Errors surfaced by the data-access layer.
///
/// The taxonomy follows three families: usage errors detected before any
/// store call is made, failures reported by the underlying store, and
/// requests for functionality the native format cannot express. Semantic
/// warnings (lossy no-data attributes, conflicting dimension sizes,
/// coordinate-order ambiguity) are not errors; they are logged and the
/// operation continues with a documented fallback.
#[derive(Error, Debug)]
pub enum Error {
    /// A request that is malformed independently of store state, e.g. an
    /// empty entity name or a count/step vector of the wrong rank.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A type or operation the native format has no representation for.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Mutation attempted on a store opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// The underlying store reported a failure for a native call.
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::NotSupported(msg.into())
    }

    pub(crate) fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
}
