use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// The raw, already-open connection one [`Response`](crate::Response) wraps.
///
/// Every method is fire-and-forget: the implementation buffers internally
/// and never blocks the caller. Implementations validate header bytes
/// themselves, the response layer passes them through untouched.
///
/// # Examples
/// ```
/// use maker_reply::{AbortSignal, Connection, Upgrade};
///
/// #[derive(Default)]
/// struct Stdout {
///     aborted: Option<AbortSignal>,
/// }
///
/// impl Connection for Stdout {
///     type UserData = ();
///     type UpgradeSocket = ();
///
///     fn write_status(&mut self, status: &[u8]) {
///         println!("HTTP/1.1 {}", String::from_utf8_lossy(status));
///     }
///     fn write_header(&mut self, name: &[u8], value: &[u8]) {
///         println!("{}: {}", String::from_utf8_lossy(name), String::from_utf8_lossy(value));
///     }
///     fn write(&mut self, chunk: &[u8]) {
///         print!("{}", String::from_utf8_lossy(chunk));
///     }
///     fn end(&mut self, body: &[u8]) {
///         println!("{}", String::from_utf8_lossy(body));
///     }
///     fn upgrade(&mut self, _: Upgrade<(), ()>) {}
///     fn on_aborted(&mut self, signal: AbortSignal) {
///         self.aborted = Some(signal);
///     }
/// }
/// ```
pub trait Connection {
    /// Opaque value handed to the WebSocket layer on upgrade.
    type UserData;
    /// Upgrade-capable socket consumed by [`upgrade`](Connection::upgrade).
    type UpgradeSocket;

    /// Writes the status line, `status` being `"<code> <reason>"`.
    fn write_status(&mut self, status: &[u8]);

    fn write_header(&mut self, name: &[u8], value: &[u8]);

    /// Writes a partial body chunk.
    fn write(&mut self, chunk: &[u8]);

    /// Writes the final body bytes and ends the response.
    fn end(&mut self, body: &[u8]);

    /// Starts batching: writes until [`uncork`](Connection::uncork) are
    /// flushed as one network operation.
    #[inline]
    fn cork(&mut self) {}

    #[inline]
    fn uncork(&mut self) {}

    /// Converts the connection into a WebSocket connection.
    fn upgrade(&mut self, upgrade: Upgrade<Self::UserData, Self::UpgradeSocket>);

    /// Registers the signal fired when the peer or transport closes the
    /// connection. Called exactly once per response.
    fn on_aborted(&mut self, signal: AbortSignal);
}

/// Arguments of a WebSocket handoff, taken from the request headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Upgrade<D, S> {
    pub user_data: D,
    pub key: Option<String>,
    pub protocol: Option<String>,
    pub extensions: Option<String>,
    pub socket: S,
}

/// One-shot, idempotent notification that a connection went away.
///
/// Clones share the same flag. Firing more than once has no further effect.
///
/// ```
/// use maker_reply::AbortSignal;
///
/// let signal = AbortSignal::new();
/// let transport_side = signal.clone();
///
/// assert!(!signal.is_fired());
/// assert!(transport_side.fire());
/// assert!(!transport_side.fire());
/// assert!(signal.is_fired());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` only for the call that fired it.
    #[inline]
    pub fn fire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A single interaction with a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Status(String),
    Header(String, String),
    Write(Vec<u8>),
    End(Vec<u8>),
    Cork,
    Uncork,
    Upgrade(Upgrade<String, u32>),
}

/// In-memory [`Connection`] that records every call.
///
/// Used by tests and examples. `UserData` is a `String` and the upgrade
/// socket is a plain `u32` id.
///
/// ```
/// use maker_reply::{Call, RecordingConnection, Response};
///
/// let mut resp = Response::bare(RecordingConnection::new());
/// resp.status(404)?.send("gone");
///
/// assert_eq!(
///     resp.raw().calls(),
///     [Call::Status("404 Not Found".into()), Call::End(b"gone".to_vec())]
/// );
/// # Ok::<(), maker_reply::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct RecordingConnection {
    calls: Vec<Call>,
    abort: Option<AbortSignal>,
    registrations: usize,
}

impl RecordingConnection {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Simulates a peer disconnect by firing the registered signal.
    pub fn abort(&self) {
        if let Some(signal) = &self.abort {
            signal.fire();
        }
    }

    /// Signal registered through [`Connection::on_aborted`], if any.
    #[inline]
    pub fn abort_signal(&self) -> Option<&AbortSignal> {
        self.abort.as_ref()
    }

    /// How many times [`Connection::on_aborted`] was called.
    #[inline]
    pub fn abort_registrations(&self) -> usize {
        self.registrations
    }

    /// Values of every recorded header called `name`.
    pub fn headers(&self, name: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Header(key, value) if key.eq_ignore_ascii_case(name) => Some(&**value),
                _ => None,
            })
            .collect()
    }

    /// Body passed to [`Connection::end`], if the response ended.
    pub fn ended_with(&self) -> Option<&[u8]> {
        self.calls.iter().find_map(|call| match call {
            Call::End(body) => Some(&**body),
            _ => None,
        })
    }
}

impl Connection for RecordingConnection {
    type UserData = String;
    type UpgradeSocket = u32;

    fn write_status(&mut self, status: &[u8]) {
        self.calls
            .push(Call::Status(String::from_utf8_lossy(status).into_owned()));
    }

    fn write_header(&mut self, name: &[u8], value: &[u8]) {
        self.calls.push(Call::Header(
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }

    fn write(&mut self, chunk: &[u8]) {
        self.calls.push(Call::Write(chunk.to_vec()));
    }

    fn end(&mut self, body: &[u8]) {
        self.calls.push(Call::End(body.to_vec()));
    }

    fn cork(&mut self) {
        self.calls.push(Call::Cork);
    }

    fn uncork(&mut self) {
        self.calls.push(Call::Uncork);
    }

    fn upgrade(&mut self, upgrade: Upgrade<String, u32>) {
        self.calls.push(Call::Upgrade(upgrade));
    }

    fn on_aborted(&mut self, signal: AbortSignal) {
        self.registrations += 1;
        self.abort = Some(signal);
    }
}

#[cfg(test)]
mod connection_tests {
    use super::*;

    #[test]
    fn signal_is_idempotent() {
        let signal = AbortSignal::new();
        let other = signal.clone();

        assert!(other.fire());
        for _ in 0..3 {
            assert!(!signal.fire());
            assert!(other.fire() == false);
        }
        assert!(signal.is_fired());
    }

    #[test]
    fn recording() {
        let mut conn = RecordingConnection::new();

        conn.write_status(b"200 OK");
        conn.write_header(b"Content-Type", b"text/plain");
        conn.write(b"a");
        conn.end(b"b");

        assert_eq!(conn.headers("content-type"), ["text/plain"]);
        assert_eq!(conn.ended_with(), Some(&b"b"[..]));
        assert_eq!(conn.calls().len(), 4);
    }

    #[test]
    fn abort_without_registration_is_harmless() {
        let conn = RecordingConnection::new();
        conn.abort();
        assert!(conn.abort_signal().is_none());
        assert_eq!(conn.abort_registrations(), 0);
    }
}
