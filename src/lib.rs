//! maker_reply - write-once HTTP response lifecycle over a raw connection
//!
//! A [`Response`] wraps one already-open [`Connection`] and enforces the
//! order of a response on the wire: status line, then headers, then body,
//! with exactly one terminal write. Calls made after the response ended,
//! upgraded or lost its peer are silent no-ops, so handlers racing a
//! client disconnect never write into a dead socket.
//!
//! # Features
//!
//! - **Ordering contract** - `status()` first, misuse reported as [`Error`]
//! - **Cookies** - `Set-Cookie` serialization with HMAC-SHA256 signing ([`cookie`])
//! - **WebSocket handoff** - [`Response::upgrade`] forwards the handshake fields
//! - **Abort safety** - an [`AbortSignal`] folds peer disconnects into completion
//! - **Error escape** - [`Response::throw_error`] routes failures to an [`ErrorSink`]
//! - **Tokio transport** - [`stream::StreamConnection`] for any `AsyncWrite`
//!
//! # Examples
//!
//! With the in-memory connection:
//! ```
//! use maker_reply::{Call, RecordingConnection, Response, StatusCode};
//!
//! let mut resp = Response::bare(RecordingConnection::new());
//! resp.status(StatusCode::Ok)?
//!     .content_type("json")
//!     .send(r#"{"hello":"world"}"#);
//!
//! assert_eq!(
//!     resp.raw().calls(),
//!     [
//!         Call::Status("200 OK".into()),
//!         Call::Header("content-type".into(), "application/json".into()),
//!         Call::End(br#"{"hello":"world"}"#.to_vec()),
//!     ]
//! );
//! # Ok::<(), maker_reply::Error>(())
//! ```
//! Over a TCP stream:
//! ```no_run
//! use maker_reply::{stream::StreamConnection, Context, RequestHeaders, Response};
//! use std::sync::Arc;
//! use tokio::net::TcpStream;
//!
//! async fn answer(socket: TcpStream, headers: RequestHeaders, context: Arc<Context<StreamConnection>>) {
//!     let (conn, flusher) = StreamConnection::new(socket);
//!     let writer = tokio::spawn(flusher.run());
//!
//!     let mut resp = Response::new(conn, headers, context);
//!     if let Err(err) = resp.json(&[1, 2, 3]) {
//!         resp.throw_error(err);
//!     }
//!
//!     let _ = writer.await;
//! }
//! ```

pub(crate) mod http {
    pub mod cookie;
    pub(crate) mod headers;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod context;
    pub mod stream;
}
pub mod config;
pub(crate) mod errors;

pub use crate::{
    errors::Error,
    http::{
        cookie::{self, CookieOptions, SameSite},
        headers::RequestHeaders,
        response::{
            write::{BodyWriter, WriteBuffer},
            Response,
        },
        types::{mime, mime_or_default, reason_phrase, IntoStatusCode, StatusCode, DEFAULT_MIME},
    },
    server::{
        connection::{AbortSignal, Call, Connection, RecordingConnection, Upgrade},
        context::{Context, ContextBuilder, ErrorSink, LogErrorSink, Session},
        stream,
    },
};

#[cfg(test)]
pub mod tools {
    use std::str::from_utf8;

    #[inline]
    pub fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }
}
