use std::{error, io};

/// Errors surfaced by [`Response`](crate::Response) operations.
///
/// Two classes exist. Misuse errors ([`StatusAfterHeaders`](Error::StatusAfterHeaders),
/// [`UpgradeUnavailable`](Error::UpgradeUnavailable)) are contract violations in
/// the calling handler and must never be retried. The remaining variants wrap
/// failures that come from collaborators (serializer, transport, handler code)
/// and are forwarded unchanged.
///
/// Operations invoked after the response completed or the peer went away are
/// **not** errors: they are silent no-ops.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `status()` was called after the header phase was entered.
    #[error("status() must be the first call and may be called only once")]
    StatusAfterHeaders,

    /// `upgrade()` was called on a response whose request did not come
    /// through an upgrade-eligible path.
    #[error("upgrade() requires a response created with an upgrade socket")]
    UpgradeUnavailable,

    /// A cookie part is not allowed on the wire: a name that is not a
    /// token, a value outside cookie-octets, or a `Domain`/`Path` holding
    /// `;` or control characters.
    #[error("invalid cookie {0}")]
    InvalidCookie(&'static str),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arbitrary error raised by application code and routed through
    /// [`Response::throw_error`](crate::Response::throw_error).
    #[error(transparent)]
    Handler(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any application error.
    #[inline]
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error::Handler(err.into())
    }

    /// Returns `true` for programmer contract violations.
    #[inline]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Error::StatusAfterHeaders | Error::UpgradeUnavailable)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::StatusAfterHeaders, Error::StatusAfterHeaders) => true,
            (Error::UpgradeUnavailable, Error::UpgradeUnavailable) => true,
            (Error::InvalidCookie(a), Error::InvalidCookie(b)) => a == b,
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
