//! The write-once response lifecycle over a single [`Connection`].

use crate::{
    config::ResponseConfig,
    errors::Error,
    http::{
        cookie::{self, CookieOptions},
        headers::RequestHeaders,
        types::{mime_or_default, write_status_line, IntoStatusCode, StatusCode},
    },
    server::{
        connection::{AbortSignal, Connection, Upgrade},
        context::{Context, Session},
    },
    BodyWriter, WriteBuffer,
};
use serde::Serialize;
use std::{
    borrow::Cow,
    fmt,
    rc::Rc,
    sync::Arc,
    time::{Duration, SystemTime},
};

/// HTTP response bound to one connection for the lifetime of one request.
///
/// Enforces the order of a response on the wire: status line first,
/// then headers, then body, with exactly one terminal write. Terminal
/// operations are [`send()`](Response::send), [`redirect()`](Response::redirect),
/// [`json()`](Response::json), [`html()`](Response::html) and
/// [`upgrade()`](Response::upgrade).
///
/// Once the response is complete, or the connection reported an abort,
/// every operation becomes a silent no-op: nothing reaches the connection
/// and boolean-returning operations return `false`.
///
/// # Examples
/// ```
/// use maker_reply::{RecordingConnection, Response, StatusCode};
/// use std::time::Duration;
///
/// let mut resp = Response::bare(RecordingConnection::new());
///
/// let sent = resp
///     .status(StatusCode::Created)?
///     .header("x-request-id", 42)
///     .cookie("theme", "dark", Some(Duration::from_secs(3600)), None, true)
///     .html("<h1>Created</h1>");
///
/// assert!(sent);
/// assert!(resp.is_completed());
/// assert!(!resp.send("too late"));
/// # Ok::<(), maker_reply::Error>(())
/// ```
///
/// # Errors
/// Misuse of the ordering contract is reported as an [`Error`]:
/// - [`status()`](Response::status) after the header phase began
/// - [`upgrade()`](Response::upgrade) without an upgrade socket
pub struct Response<C: Connection> {
    connection: C,
    upgrade_socket: Option<C::UpgradeSocket>,
    request_headers: RequestHeaders,
    session: Option<Box<dyn Session<C> + Send>>,
    context: Arc<Context<C>>,

    abort: AbortSignal,
    state: ResponseState,
    buffer: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    /// Open, nothing written yet.
    Clean,
    /// Open, status/header/cookie/body writes happened.
    Headers,
    /// Terminal: ended, upgraded or aborted.
    Complete,
}

impl<C: Connection> Response<C> {
    /// Binds a response to `connection` and subscribes to its abort
    /// notification.
    pub fn new(
        mut connection: C,
        request_headers: RequestHeaders,
        context: Arc<Context<C>>,
    ) -> Self {
        let abort = AbortSignal::new();
        connection.on_aborted(abort.clone());

        Self {
            buffer: Vec::with_capacity(context.config().default_capacity),
            connection,
            upgrade_socket: None,
            request_headers,
            session: None,
            context,

            abort,
            state: ResponseState::Clean,
        }
    }

    /// A response with no request headers and a default [`Context`].
    pub fn bare(connection: C) -> Self {
        Self::new(connection, RequestHeaders::new(), Arc::new(Context::default()))
    }

    /// Marks the response as coming from an upgrade-eligible path.
    #[inline]
    pub fn with_upgrade_socket(mut self, socket: C::UpgradeSocket) -> Self {
        self.upgrade_socket = Some(socket);
        self
    }

    /// Attaches the request's session, closed by [`send()`](Response::send).
    #[inline]
    pub fn with_session<S>(mut self, session: S) -> Self
    where
        S: Session<C> + Send + 'static,
    {
        self.session = Some(Box::new(session));
        self
    }

    // Folds a fired abort signal into the state.
    #[inline(always)]
    fn is_open(&mut self) -> bool {
        if self.state != ResponseState::Complete && self.abort.is_fired() {
            log::trace!("connection aborted, response closed without writing");
            self.state = ResponseState::Complete;
        }
        self.state != ResponseState::Complete
    }

    #[inline(always)]
    fn complete(&mut self) {
        self.state = ResponseState::Complete;
    }

    #[inline(always)]
    fn release_buffer(&mut self) {
        let config: &ResponseConfig = self.context.config();
        if self.buffer.capacity() > config.max_capacity {
            self.buffer = Vec::with_capacity(config.default_capacity);
        } else {
            self.buffer.clear();
        }
    }

    #[inline(always)]
    fn dropped(&self, operation: &'static str) {
        log::trace!("{operation}() ignored, response already complete");
    }
}

/// Status line and headers
impl<C: Connection> Response<C> {
    /// Writes the status line.
    ///
    /// Must be the first call that touches the connection. Codes missing
    /// from the reason-phrase table are written with an empty reason.
    ///
    /// # Examples
    /// ```
    /// # use maker_reply::{RecordingConnection, Response, Error};
    /// let mut resp = Response::bare(RecordingConnection::new());
    ///
    /// resp.status(403)?;
    /// assert_eq!(resp.status(200).err(), Some(Error::StatusAfterHeaders));
    /// # Ok::<(), Error>(())
    /// ```
    ///
    /// # Errors
    /// [`Error::StatusAfterHeaders`] if a status, header, cookie or body
    /// chunk was already written.
    pub fn status(&mut self, code: impl IntoStatusCode) -> Result<&mut Self, Error> {
        if !self.is_open() {
            self.dropped("status");
            return Ok(self);
        }
        if self.state == ResponseState::Headers {
            return Err(Error::StatusAfterHeaders);
        }

        self.buffer.clear();
        write_status_line(code.into_code(), &mut self.buffer);
        self.connection.write_status(&self.buffer);
        self.state = ResponseState::Headers;
        Ok(self)
    }

    /// Writes a raw header. Names and values are not validated here.
    ///
    /// ```
    /// # use maker_reply::{RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    /// resp.header("x-custom-id", 128).header("x-cache", true);
    ///
    /// assert_eq!(resp.raw().headers("x-custom-id"), ["128"]);
    /// assert_eq!(resp.raw().headers("x-cache"), ["true"]);
    /// ```
    pub fn header<N: WriteBuffer, V: WriteBuffer>(&mut self, name: N, value: V) -> &mut Self {
        if !self.is_open() {
            self.dropped("header");
            return self;
        }

        self.buffer.clear();
        name.write_to(&mut self.buffer);
        let split = self.buffer.len();
        value.write_to(&mut self.buffer);

        let (name, value) = self.buffer.split_at(split);
        self.connection.write_header(name, value);
        self.state = ResponseState::Headers;
        self
    }

    /// Sets `content-type` from a MIME key such as `"json"` or `".png"`,
    /// falling back to `text/plain`.
    #[inline]
    pub fn content_type(&mut self, key: &str) -> &mut Self {
        self.header("content-type", mime_or_default(key))
    }

    /// Runs `f` with the connection corked, so every write issued inside
    /// leaves as one network operation. Ordering rules are unchanged.
    ///
    /// ```
    /// # use maker_reply::{Call, RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    ///
    /// let sent = resp.atomic(|resp| resp.header("x-a", "1").send("body"));
    ///
    /// assert!(sent);
    /// assert_eq!(resp.raw().calls().first(), Some(&Call::Cork));
    /// assert_eq!(resp.raw().calls().last(), Some(&Call::Uncork));
    /// ```
    pub fn atomic<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        if !self.is_open() {
            return f(self);
        }

        self.connection.cork();
        let result = f(self);
        self.connection.uncork();
        result
    }
}

/// Cookies
impl<C: Connection> Response<C> {
    /// Writes a `Set-Cookie` header.
    ///
    /// - `expiry`: lifetime from now, rendered as `Expires`; `None` makes a
    ///   session cookie.
    /// - `options`: `None` takes a fresh copy of the configured defaults
    ///   (`Secure; SameSite=None; Path=/` unless reconfigured).
    /// - `sign`: sign the value when `options.secret` is non-empty. Signed
    ///   values are written without percent-encoding.
    ///
    /// A cookie that cannot be serialized safely (see [`cookie::serialize`])
    /// is dropped: nothing is written and the header phase is not entered.
    ///
    /// ```
    /// # use maker_reply::{cookie, CookieOptions, RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    /// let options = CookieOptions {
    ///     secret: Some("s3cret".into()),
    ///     http_only: true,
    ///     ..CookieOptions::empty()
    /// };
    ///
    /// resp.cookie("sid", "abc", None, Some(options), true);
    ///
    /// let expected = format!("sid={}; HttpOnly", cookie::sign("abc", "s3cret"));
    /// assert_eq!(resp.raw().headers("set-cookie"), [expected.as_str()]);
    /// ```
    pub fn cookie(
        &mut self,
        name: &str,
        value: &str,
        expiry: Option<Duration>,
        options: Option<CookieOptions>,
        sign: bool,
    ) -> &mut Self {
        if !self.is_open() {
            self.dropped("cookie");
            return self;
        }

        let options = options.unwrap_or_else(|| self.context.config().cookie_defaults.clone());
        match cookie::build(name, value, expiry, options, sign, SystemTime::now()) {
            Ok(value) => self.header("set-cookie", value),
            Err(err) => {
                log::debug!("set-cookie for {name:?} dropped: {err}");
                self
            }
        }
    }

    /// Asks the client to drop `name` right away (`Max-Age=0`, empty value).
    ///
    /// The configured cookie defaults are applied as well (`Path=/; Secure;
    /// SameSite=None` unless reconfigured). Agents only drop a cookie whose
    /// `Path` and `Domain` match the ones it was set with, so a cookie set
    /// with other attributes needs [`cookie()`](Response::cookie) with
    /// `max_age: Some(0)` and those attributes instead.
    ///
    /// ```
    /// # use maker_reply::{RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    /// resp.delete_cookie("session");
    ///
    /// assert_eq!(
    ///     resp.raw().headers("set-cookie"),
    ///     ["session=; Max-Age=0; Path=/; Secure; SameSite=None"]
    /// );
    /// ```
    pub fn delete_cookie(&mut self, name: &str) -> &mut Self {
        if !self.is_open() {
            self.dropped("delete_cookie");
            return self;
        }

        let options = CookieOptions {
            max_age: Some(0),
            ..self.context.config().cookie_defaults.clone()
        };
        self.cookie(name, "", None, Some(options), true)
    }
}

/// Body and completion
impl<C: Connection> Response<C> {
    /// Streams a partial body chunk. Does not complete the response.
    pub fn write<T: WriteBuffer>(&mut self, chunk: T) -> &mut Self {
        if !self.is_open() {
            self.dropped("write");
            return self;
        }

        self.buffer.clear();
        chunk.write_to(&mut self.buffer);
        self.connection.write(&self.buffer);
        self.state = ResponseState::Headers;
        self
    }

    /// Ends the response with `body` (`()` or `""` for none).
    ///
    /// A ready session is closed first, while headers can still be
    /// written. Returns `false` if the response was already complete.
    ///
    /// ```
    /// # use maker_reply::{RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    ///
    /// assert!(resp.write("Hello, ").send("World!"));
    /// assert!(!resp.send(()));
    /// assert_eq!(resp.raw().ended_with(), Some(&b"World!"[..]));
    /// ```
    pub fn send<T: WriteBuffer>(&mut self, body: T) -> bool {
        if !self.is_open() {
            self.dropped("send");
            return false;
        }

        if let Some(mut session) = self.session.take() {
            if session.is_ready() {
                let context = Arc::clone(&self.context);
                session.perform_closure(self, &context);
            }
            self.session = Some(session);

            // The closure may have ended the response or observed an abort.
            if !self.is_open() {
                self.dropped("send");
                return false;
            }
        }

        self.complete();
        self.buffer.clear();
        body.write_to(&mut self.buffer);
        self.connection.end(&self.buffer);
        self.release_buffer();

        log::trace!("response ended");
        true
    }

    /// Ends the response with a body rendered by `f`.
    ///
    /// ```
    /// # use maker_reply::{RecordingConnection, Response};
    /// use std::io::Write;
    ///
    /// let mut resp = Response::bare(RecordingConnection::new());
    /// resp.send_with(|w| {
    ///     w.write("id=");
    ///     let _ = write!(w, "{}", 7);
    /// });
    ///
    /// assert_eq!(resp.raw().ended_with(), Some(&b"id=7"[..]));
    /// ```
    pub fn send_with<F: FnOnce(&mut BodyWriter)>(&mut self, f: F) -> bool {
        if !self.is_open() {
            self.dropped("send_with");
            return false;
        }

        let mut body = Vec::new();
        f(&mut BodyWriter(&mut body));
        self.send(body)
    }

    /// `302 Found` to `url`, same as `status(302)`, `header("location", url)`
    /// and `send(())`.
    ///
    /// # Errors
    /// [`Error::StatusAfterHeaders`] if the header phase already began.
    pub fn redirect(&mut self, url: &str) -> Result<bool, Error> {
        if !self.is_open() {
            self.dropped("redirect");
            return Ok(false);
        }

        Ok(self
            .status(StatusCode::Found)?
            .header("location", url)
            .send(()))
    }

    /// Serializes `value`, sets `content-type: application/json` and ends
    /// the response.
    ///
    /// ```
    /// # use maker_reply::{RecordingConnection, Response};
    /// let mut resp = Response::bare(RecordingConnection::new());
    ///
    /// assert!(resp.json(&std::collections::BTreeMap::from([("a", 1)]))?);
    /// assert_eq!(resp.raw().headers("content-type"), ["application/json"]);
    /// assert_eq!(resp.raw().ended_with(), Some(&br#"{"a":1}"#[..]));
    /// # Ok::<(), maker_reply::Error>(())
    /// ```
    ///
    /// # Errors
    /// [`Error::Json`] when serialization fails; nothing is written then.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<bool, Error> {
        if !self.is_open() {
            self.dropped("json");
            return Ok(false);
        }

        let body = serde_json::to_vec(value)?;
        Ok(self.content_type("json").send(body))
    }

    /// Sets `content-type: text/html` and ends the response with `markup`.
    pub fn html<T: WriteBuffer>(&mut self, markup: T) -> bool {
        if !self.is_open() {
            self.dropped("html");
            return false;
        }

        self.content_type("html").send(markup)
    }
}

/// Upgrade, errors, accessors
impl<C: Connection> Response<C> {
    /// Hands the connection over to the WebSocket layer.
    ///
    /// Forwards `user_data`, the request's `sec-websocket-key`,
    /// `sec-websocket-protocol` and `sec-websocket-extensions`, and the
    /// upgrade socket. Afterwards the response is complete.
    ///
    /// ```
    /// # use maker_reply::{Call, Context, RecordingConnection, RequestHeaders, Response, Upgrade};
    /// # use std::sync::Arc;
    /// let headers = RequestHeaders::from_pairs([("sec-websocket-key", "k")]);
    /// let mut resp = Response::new(RecordingConnection::new(), headers, Arc::new(Context::default()))
    ///     .with_upgrade_socket(7);
    ///
    /// assert_eq!(resp.upgrade("user".into()), Ok(true));
    /// assert_eq!(resp.upgrade("again".into()), Ok(false));
    /// assert_eq!(
    ///     resp.raw().calls(),
    ///     [Call::Upgrade(Upgrade {
    ///         user_data: "user".into(),
    ///         key: Some("k".into()),
    ///         protocol: None,
    ///         extensions: None,
    ///         socket: 7,
    ///     })]
    /// );
    /// ```
    ///
    /// # Errors
    /// [`Error::UpgradeUnavailable`] if the response has no upgrade socket.
    pub fn upgrade(&mut self, user_data: C::UserData) -> Result<bool, Error> {
        if !self.is_open() {
            self.dropped("upgrade");
            return Ok(false);
        }
        let Some(socket) = self.upgrade_socket.take() else {
            return Err(Error::UpgradeUnavailable);
        };

        self.complete();
        let headers = &self.request_headers;
        let upgrade = Upgrade {
            user_data,
            key: headers.websocket_key().map(Into::into),
            protocol: headers.websocket_protocol().map(Into::into),
            extensions: headers.websocket_extensions().map(Into::into),
            socket,
        };
        self.connection.upgrade(upgrade);

        log::trace!("response upgraded to websocket");
        Ok(true)
    }

    /// Routes `err` to the context's error sink together with this response.
    pub fn throw_error(&mut self, err: impl Into<Error>)
    where
        C: 'static,
    {
        let context = Arc::clone(&self.context);
        context.error_sink().on_error(err.into(), self);
    }

    /// `true` once the response ended, upgraded or the connection aborted.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state == ResponseState::Complete || self.abort.is_fired()
    }

    /// `true` if the connection reported an abort.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_fired()
    }

    /// `true` while nothing has been written, i.e. `status()` is still allowed.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.state == ResponseState::Clean && !self.abort.is_fired()
    }

    #[inline]
    pub fn is_upgradable(&self) -> bool {
        self.upgrade_socket.is_some()
    }

    /// The underlying connection.
    #[inline]
    pub fn raw(&self) -> &C {
        &self.connection
    }

    /// Mutable access to the underlying connection. Writes made through it
    /// bypass the ordering checks.
    #[inline]
    pub fn raw_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    #[inline]
    pub fn request_headers(&self) -> &RequestHeaders {
        &self.request_headers
    }

    #[inline]
    pub fn context(&self) -> &Arc<Context<C>> {
        &self.context
    }
}

impl<C: Connection + fmt::Debug> fmt::Debug for Response<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("connection", &self.connection)
            .field("state", &self.state)
            .field("aborted", &self.abort.is_fired())
            .field("upgradable", &self.upgrade_socket.is_some())
            .field("session", &self.session.is_some())
            .finish()
    }
}

pub mod write {
    use super::*;

    /// Writer for a response body rendered in place.
    /// Used in [send_with](Response::send_with).
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the body.
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Values that can be rendered into a header name, header value or
    /// body chunk.
    ///
    /// Implemented for strings, bytes, booleans, chars, integers and `()`
    /// (renders nothing). Floats are left out to keep protocol output
    /// free of locale and precision surprises.
    ///
    /// # Example
    /// ```
    /// use maker_reply::WriteBuffer;
    ///
    /// struct UserId(u64);
    ///
    /// impl WriteBuffer for UserId {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.extend_from_slice(b"user-");
    ///         self.0.write_to(buffer);
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Appends the value's representation to `buffer`.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (integer => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    buffer.extend_from_slice(itoa::Buffer::new().format(*self).as_bytes());
                }
            })*
        };
    }

    impl<T: WriteBuffer + ?Sized> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => str, String, Box<str>, Cow<'_, str>, Arc<str>, Rc<str>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => [u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>, Arc<[u8]>, Rc<[u8]>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        integer => u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }
    impl WriteBuffer for () {
        #[inline]
        fn write_to(&self, _: &mut Vec<u8>) {}
    }
}



#[cfg(test)]
mod cookie_tests {
    use super::*;
    use crate::RecordingConnection;

    fn expires_of(header: &str) -> SystemTime {
        let value = header
            .split("; ")
            .find_map(|attr| attr.strip_prefix("Expires="))
            .expect("Expires attribute");
        httpdate::parse_http_date(value).expect("valid http date")
    }

    fn set_cookie(resp: &Response<RecordingConnection>) -> String {
        let headers = resp.raw().headers("set-cookie");
        assert_eq!(headers.len(), 1);
        headers[0].to_owned()
    }

    #[test]
    fn signing_changes_value() {
        let expiry = Some(Duration::from_millis(60_000));

        let mut signed = Response::bare(RecordingConnection::new());
        let options = CookieOptions {
            secret: Some("s".into()),
            ..CookieOptions::empty()
        };
        signed.cookie("a", "b", expiry, Some(options), true);

        let mut plain = Response::bare(RecordingConnection::new());
        plain.cookie("a", "b", expiry, Some(CookieOptions::empty()), true);

        let (signed, plain) = (set_cookie(&signed), set_cookie(&plain));
        assert_ne!(signed, plain);
        assert!(signed.starts_with(&format!("a={};", cookie::sign("b", "s"))));
        assert!(plain.starts_with("a=b;"));

        // Both expire about a minute from now; http dates have 1s resolution.
        let target = SystemTime::now() + Duration::from_millis(60_000);
        for header in [signed, plain] {
            let expires = expires_of(&header);
            let drift = match expires.duration_since(target) {
                Ok(ahead) => ahead,
                Err(behind) => behind.duration(),
            };
            assert!(drift <= Duration::from_secs(2), "{header}");
        }
    }

    #[test]
    fn defaults_when_no_options() {
        let mut resp = Response::bare(RecordingConnection::new());
        resp.cookie("theme", "dark", None, None, true);

        assert_eq!(set_cookie(&resp), "theme=dark; Path=/; Secure; SameSite=None");
    }

    #[test]
    fn defaults_are_not_shared_between_calls() {
        let mut resp = Response::bare(RecordingConnection::new());
        resp.cookie("a", "1", Some(Duration::from_secs(10)), None, true);
        resp.cookie("b", "2", None, None, true);

        let headers = resp.raw().headers("set-cookie");
        assert!(headers[0].contains("Expires="));
        assert!(!headers[1].contains("Expires="));
    }

    #[test]
    fn unsigned_when_requested() {
        let mut resp = Response::bare(RecordingConnection::new());
        let options = CookieOptions {
            secret: Some("s".into()),
            ..CookieOptions::empty()
        };
        resp.cookie("a", "b c", None, Some(options), false);

        assert_eq!(set_cookie(&resp), "a=b%20c");
    }

    #[test]
    fn delete() {
        let mut resp = Response::bare(RecordingConnection::new());
        resp.delete_cookie("session");

        let header = set_cookie(&resp);
        assert!(header.starts_with("session=;"));
        assert!(header.contains("Max-Age=0"));
        assert!(!header.contains("Expires="));
    }

    #[test]
    fn injected_attributes_are_dropped() {
        let mut resp = Response::bare(RecordingConnection::new());
        let options = CookieOptions {
            secret: Some("s".into()),
            ..CookieOptions::default()
        };
        resp.cookie(
            "sid",
            "x; Domain=evil.example; HttpOnly",
            None,
            Some(options),
            true,
        );

        assert!(resp.raw().calls().is_empty());
        assert!(resp.is_clean());
        assert!(resp.status(200).is_ok());
    }

    #[test]
    fn far_expiry_is_clamped() {
        let mut resp = Response::bare(RecordingConnection::new());
        resp.cookie(
            "a",
            "b",
            Some(Duration::from_secs(300_000_000_000)),
            None,
            true,
        );

        assert_eq!(
            set_cookie(&resp),
            "a=b; Expires=Fri, 31 Dec 9999 23:59:59 GMT; Path=/; Secure; SameSite=None"
        );
    }

    #[test]
    fn uses_configured_defaults() {
        let context = Context::builder()
            .config(ResponseConfig {
                cookie_defaults: CookieOptions {
                    http_only: true,
                    domain: Some("example.com".into()),
                    ..CookieOptions::default()
                },
                ..ResponseConfig::default()
            })
            .build();
        let mut resp = Response::new(
            RecordingConnection::new(),
            RequestHeaders::new(),
            Arc::new(context),
        );
        resp.cookie("a", "b", None, None, true);

        assert_eq!(
            set_cookie(&resp),
            "a=b; Domain=example.com; Path=/; Secure; HttpOnly; SameSite=None"
        );
    }
}

#[cfg(test)]
mod body_tests {
    use super::*;
    use crate::{Call, RecordingConnection};
    use serde::ser::{Error as _, Serializer};

    fn resp() -> Response<RecordingConnection> {
        Response::bare(RecordingConnection::new())
    }

    #[test]
    fn write_then_send() {
        let mut resp = resp();

        resp.write("a").write(1).write(b"c");
        assert_eq!(resp.state, ResponseState::Headers);
        assert!(resp.send("end"));

        assert_eq!(
            resp.raw().calls(),
            [
                Call::Write(b"a".to_vec()),
                Call::Write(b"1".to_vec()),
                Call::Write(b"c".to_vec()),
                Call::End(b"end".to_vec()),
            ]
        );
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    fn send_once() {
        let mut resp = resp();

        assert!(resp.send(()));
        assert!(!resp.send("again"));
        assert_eq!(resp.raw().calls(), [Call::End(Vec::new())]);
    }

    #[test]
    fn json() {
        #[derive(Serialize)]
        struct Body {
            a: u8,
        }

        let mut resp = resp();
        assert_eq!(resp.json(&Body { a: 1 }), Ok(true));

        assert_eq!(
            resp.raw().calls(),
            [
                Call::Header("content-type".into(), "application/json".into()),
                Call::End(br#"{"a":1}"#.to_vec()),
            ]
        );
    }

    #[test]
    fn json_error_propagates() {
        struct Broken;

        impl Serialize for Broken {
            fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("cycle detected"))
            }
        }

        let mut resp = resp();
        let err = resp.json(&Broken).unwrap_err();

        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("cycle detected"));
        assert!(resp.raw().calls().is_empty());
        assert!(!resp.is_completed());
    }

    #[test]
    fn html() {
        let mut resp = resp();
        assert!(resp.html("<p>hi</p>"));

        assert_eq!(
            resp.raw().calls(),
            [
                Call::Header("content-type".into(), "text/html".into()),
                Call::End(b"<p>hi</p>".to_vec()),
            ]
        );
    }

    #[test]
    fn redirect_equivalence() {
        let mut redirected = resp();
        assert_eq!(redirected.redirect("/login"), Ok(true));

        let mut manual = resp();
        manual
            .status(302)
            .unwrap()
            .header("location", "/login")
            .send(());

        assert_eq!(redirected.raw().calls(), manual.raw().calls());
    }

    #[test]
    fn redirect_after_header_is_misuse() {
        let mut resp = resp();
        resp.header("x", "y");

        assert_eq!(resp.redirect("/"), Err(Error::StatusAfterHeaders));
        assert!(!resp.is_completed());
    }

    #[test]
    fn redirect_after_completion() {
        let mut resp = resp();
        resp.send(());

        assert_eq!(resp.redirect("/login"), Ok(false));
        assert_eq!(resp.raw().calls().len(), 1);
    }

    #[test]
    fn send_with() {
        let mut resp = resp();
        assert!(resp.send_with(|w| {
            w.write("x=");
            w.write(10);
        }));

        assert_eq!(resp.raw().ended_with(), Some(&b"x=10"[..]));
        assert!(!resp.send_with(|w| w.write("late")));
    }

    #[test]
    fn atomic_brackets_writes() {
        let mut resp = resp();
        let value = resp.atomic(|resp| {
            resp.status(200).unwrap().write("a");
            5
        });

        assert_eq!(value, 5);
        assert_eq!(
            resp.raw().calls(),
            [
                Call::Cork,
                Call::Status("200 OK".into()),
                Call::Write(b"a".to_vec()),
                Call::Uncork,
            ]
        );
    }

    #[test]
    fn atomic_after_completion_skips_cork() {
        let mut resp = resp();
        resp.send(());

        let sent = resp.atomic(|resp| resp.send("x"));
        assert!(!sent);
        assert_eq!(resp.raw().calls(), [Call::End(Vec::new())]);
    }

    #[test]
    fn buffer_is_released() {
        let mut resp = resp();
        let big = vec![b'x'; 64 * 1024];

        resp.send(big);
        assert!(resp.buffer.capacity() <= resp.context.config().max_capacity);
    }
}
