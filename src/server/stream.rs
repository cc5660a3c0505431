//! HTTP/1.1 [`Connection`] over any tokio [`AsyncWrite`].
//!
//! [`StreamConnection`] serializes every call into wire bytes and queues
//! them; the paired [`Flusher`] drains the queue into the writer. The read
//! side of the socket reports a peer close through [`Closer`].

use crate::{AbortSignal, Connection, Upgrade};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};
use std::{
    fmt, io,
    marker::PhantomData,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};

const WEBSOCKET_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// What the WebSocket layer receives after a successful upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct Upgraded<D> {
    pub user_data: D,
    pub key: Option<String>,
    pub protocol: Option<String>,
    pub extensions: Option<String>,
}

/// Upgrade socket of a [`StreamConnection`].
pub type UpgradeSender<D> = oneshot::Sender<Upgraded<D>>;

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    signal: OnceLock<AbortSignal>,
}

impl Shared {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(signal) = self.signal.get() {
            if signal.fire() {
                log::debug!("connection closed, abort signal fired");
            }
        }
    }

    fn register(&self, signal: AbortSignal) {
        if self.signal.set(signal).is_err() {
            log::debug!("abort signal already registered, ignoring");
            return;
        }
        // Close may have happened before registration.
        if self.closed.load(Ordering::SeqCst) {
            self.close();
        }
    }
}

/// Connection writing HTTP/1.1 to a tokio stream.
///
/// - the status line and headers are held back until the first body write,
///   so a header before any status implies `200 OK`;
/// - header names or values containing CR or LF are dropped;
/// - [`write`](Connection::write) switches to chunked transfer encoding,
///   a bare [`end`](Connection::end) sends `content-length`, unless the
///   handler wrote its own `content-length` or `transfer-encoding`; a second
///   framing header is dropped;
/// - `1xx`, `204` and `304` responses get no framing header and no body;
/// - [`upgrade`](Connection::upgrade) answers `101 Switching Protocols`
///   and hands the request's WebSocket fields to the [`UpgradeSender`].
///
/// ```
/// use maker_reply::{stream::StreamConnection, Context, RequestHeaders, Response};
/// use std::sync::Arc;
/// use tokio::io::AsyncReadExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let (client, server) = tokio::io::duplex(1024);
/// let (conn, flusher) = StreamConnection::<()>::new(server);
///
/// let mut resp = Response::new(conn, RequestHeaders::new(), Arc::new(Context::default()));
/// resp.content_type("txt").send("hi");
///
/// drop(flusher.run().await?);
///
/// let mut wire = String::new();
/// let mut client = client;
/// client.read_to_string(&mut wire).await?;
/// assert_eq!(
///     wire,
///     "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nhi"
/// );
/// # Ok(())
/// # }
/// ```
pub struct StreamConnection<D = ()> {
    sender: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shared: Arc<Shared>,

    head: Vec<u8>,
    out: Vec<u8>,
    has_status: bool,
    head_sent: bool,
    corked: bool,

    framing: Option<Framing>,
    chunked: bool,
    bodiless: bool,

    _marker: PhantomData<fn() -> D>,
}

impl<D> StreamConnection<D> {
    /// Creates a connection and the [`Flusher`] that owns `writer`.
    pub fn new<W>(writer: W) -> (Self, Flusher<W>)
    where
        W: AsyncWrite + Unpin,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let conn = Self {
            sender: Some(sender),
            shared: Arc::clone(&shared),

            head: Vec::with_capacity(256),
            out: Vec::new(),
            has_status: false,
            head_sent: false,
            corked: false,

            framing: None,
            chunked: false,
            bodiless: false,

            _marker: PhantomData,
        };
        let flusher = Flusher {
            writer,
            receiver,
            shared,
        };

        (conn, flusher)
    }

    /// Handle for the read side to report that the peer went away.
    #[inline]
    pub fn closer(&self) -> Closer {
        Closer(Arc::clone(&self.shared))
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.sender.is_none()
    }

    fn ensure_status(&mut self) {
        if !self.has_status {
            self.head.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
            self.has_status = true;
        }
    }

    // Moves the buffered head (plus `last` header) into `out`.
    fn send_head(&mut self, last: &[u8]) {
        self.ensure_status();
        self.out.append(&mut self.head);
        self.out.extend_from_slice(last);
        self.out.extend_from_slice(b"\r\n");
        self.head_sent = true;
    }

    fn flush(&mut self) {
        if self.corked || self.out.is_empty() {
            return;
        }
        let Some(sender) = &self.sender else {
            self.out.clear();
            return;
        };

        if sender.send(mem::take(&mut self.out)).is_err() {
            log::debug!("flusher gone, dropping queued bytes");
            self.shared.close();
        }
    }

    // Sends the head with the framing the body needs.
    fn start_body(&mut self, streaming: bool, length: usize) {
        match self.framing {
            Some(Framing::Chunked) => {
                self.chunked = true;
                self.send_head(b"");
            }
            Some(Framing::Length) => self.send_head(b""),
            None if self.bodiless => self.send_head(b""),
            None if streaming => {
                self.chunked = true;
                self.send_head(b"transfer-encoding: chunked\r\n");
            }
            None => {
                let mut header = Vec::with_capacity(40);
                header.extend_from_slice(b"content-length: ");
                header.extend_from_slice(itoa::Buffer::new().format(length).as_bytes());
                header.extend_from_slice(b"\r\n");
                self.send_head(&header);
            }
        }
    }

    fn push_body(&mut self, bytes: &[u8]) {
        if self.bodiless {
            if !bytes.is_empty() {
                log::debug!("body of a bodiless status dropped");
            }
        } else if self.chunked {
            write_chunk(&mut self.out, bytes);
        } else {
            self.out.extend_from_slice(bytes);
        }
    }

    fn finish(&mut self) {
        self.corked = false;
        self.flush();
        self.sender = None;
    }
}

impl<D> Connection for StreamConnection<D> {
    type UserData = D;
    type UpgradeSocket = UpgradeSender<D>;

    fn write_status(&mut self, status: &[u8]) {
        if self.has_status || self.is_finished() {
            log::debug!("late status line dropped");
            return;
        }

        self.head.extend_from_slice(b"HTTP/1.1 ");
        self.head.extend_from_slice(status);
        self.head.extend_from_slice(b"\r\n");
        self.has_status = true;
        self.bodiless = is_bodiless(status);
    }

    fn write_header(&mut self, name: &[u8], value: &[u8]) {
        if self.head_sent || self.is_finished() {
            log::debug!("header after body start dropped");
            return;
        }
        if has_line_break(name) || has_line_break(value) || name.is_empty() {
            log::debug!("invalid header dropped");
            return;
        }

        let framing = if name.eq_ignore_ascii_case(b"content-length") {
            Some(Framing::Length)
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            Some(Framing::Chunked)
        } else {
            None
        };
        if framing.is_some() {
            if self.framing.is_some() {
                log::debug!("conflicting framing header dropped");
                return;
            }
            self.framing = framing;
        }

        self.ensure_status();
        self.head.extend_from_slice(name);
        self.head.extend_from_slice(b": ");
        self.head.extend_from_slice(value);
        self.head.extend_from_slice(b"\r\n");
    }

    fn write(&mut self, chunk: &[u8]) {
        if self.is_finished() {
            return;
        }

        if !self.head_sent {
            self.start_body(true, 0);
        }
        self.push_body(chunk);
        self.flush();
    }

    fn end(&mut self, body: &[u8]) {
        if self.is_finished() {
            return;
        }

        if !self.head_sent {
            self.start_body(false, body.len());
        }
        self.push_body(body);
        if self.chunked && !self.bodiless {
            self.out.extend_from_slice(b"0\r\n\r\n");
        }
        self.finish();
    }

    fn cork(&mut self) {
        self.corked = true;
    }

    fn uncork(&mut self) {
        self.corked = false;
        self.flush();
    }

    fn upgrade(&mut self, upgrade: Upgrade<D, UpgradeSender<D>>) {
        if self.is_finished() {
            return;
        }
        if !self.head.is_empty() {
            log::debug!("buffered head discarded by upgrade");
            self.head.clear();
        }

        self.out.extend_from_slice(
            b"HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: Upgrade\r\n",
        );
        if let Some(key) = &upgrade.key {
            self.out.extend_from_slice(b"sec-websocket-accept: ");
            self.out.extend_from_slice(derive_accept(key).as_bytes());
            self.out.extend_from_slice(b"\r\n");
        }
        if let Some(protocol) = upgrade.protocol.as_deref().and_then(first_protocol) {
            self.out.extend_from_slice(b"sec-websocket-protocol: ");
            self.out.extend_from_slice(protocol.as_bytes());
            self.out.extend_from_slice(b"\r\n");
        }
        self.out.extend_from_slice(b"\r\n");
        self.head_sent = true;
        self.finish();

        let Upgrade {
            user_data,
            key,
            protocol,
            extensions,
            socket,
        } = upgrade;
        let upgraded = Upgraded {
            user_data,
            key,
            protocol,
            extensions,
        };
        if socket.send(upgraded).is_err() {
            log::debug!("websocket receiver gone, upgrade discarded");
        }
    }

    fn on_aborted(&mut self, signal: AbortSignal) {
        self.shared.register(signal);
    }
}

impl<D> fmt::Debug for StreamConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("head_sent", &self.head_sent)
            .field("finished", &self.is_finished())
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Drains the bytes queued by a [`StreamConnection`] into the writer.
#[derive(Debug)]
pub struct Flusher<W> {
    writer: W,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
}

impl<W: AsyncWrite + Unpin> Flusher<W> {
    /// Writes until the connection ends, upgrades or is dropped, then
    /// hands the writer back.
    ///
    /// # Errors
    /// The first write error. The connection's abort signal fires before
    /// it is returned.
    pub async fn run(mut self) -> io::Result<W> {
        while let Some(bytes) = self.receiver.recv().await {
            if let Err(err) = self.writer.write_all(&bytes).await {
                log::debug!("write failed: {err}");
                self.shared.close();
                return Err(err);
            }
        }

        if let Err(err) = self.writer.flush().await {
            log::debug!("flush failed: {err}");
            self.shared.close();
            return Err(err);
        }
        Ok(self.writer)
    }
}

/// Reports a peer close to the [`StreamConnection`] it came from.
#[derive(Debug, Clone)]
pub struct Closer(Arc<Shared>);

impl Closer {
    /// Fires the connection's abort signal, now or once it is registered.
    #[inline]
    pub fn close(&self) {
        self.0.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

/// `sec-websocket-accept` for a client's `sec-websocket-key` (RFC 6455).
///
/// ```
/// assert_eq!(
///     maker_reply::stream::derive_accept("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn derive_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.trim().as_bytes());
    sha1.update(WEBSOCKET_GUID);
    STANDARD.encode(sha1.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length,
    Chunked,
}

// Statuses that never carry a body: 1xx, 204, 304.
fn is_bodiless(status: &[u8]) -> bool {
    matches!(
        status,
        [b'1', _, _, b' ', ..] | [b'2', b'0', b'4', b' ', ..] | [b'3', b'0', b'4', b' ', ..]
    )
}

#[inline]
fn has_line_break(bytes: &[u8]) -> bool {
    memchr::memchr2(b'\r', b'\n', bytes).is_some()
}

fn first_protocol(offered: &str) -> Option<&str> {
    offered
        .split(',')
        .map(str::trim)
        .find(|protocol| !protocol.is_empty())
}

// Zero-length chunks terminate a chunked body, so they are skipped.
fn write_chunk(out: &mut Vec<u8>, chunk: &[u8]) {
    if chunk.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
    out.extend_from_slice(chunk);
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod stream_tests {
    use super::*;
    use crate::{Context, RequestHeaders, Response};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    type Conn = StreamConnection<String>;

    fn response(conn: Conn, headers: RequestHeaders) -> Response<Conn> {
        Response::new(conn, headers, Arc::new(Context::default()))
    }

    async fn wire(flusher: Flusher<DuplexStream>, mut client: DuplexStream) -> String {
        drop(flusher.run().await.unwrap());

        let mut wire = String::new();
        client.read_to_string(&mut wire).await.unwrap();
        wire
    }

    #[tokio::test]
    async fn content_length_response() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.status(404).unwrap().header("x-a", 1).send("gone");

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 404 Not Found\r\nx-a: 1\r\ncontent-length: 4\r\n\r\ngone"
        );
    }

    #[tokio::test]
    async fn chunked_response() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.write("ab").write("").send("c");

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
             2\r\nab\r\n1\r\nc\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn line_breaks_are_dropped() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.header("x-bad", "a\r\nset-cookie: evil=1")
            .header("x-bad\n", "b")
            .header("x-good", "c")
            .send(());

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 200 OK\r\nx-good: c\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn corked_writes_are_one_message() {
        let (client, server) = duplex(4096);
        let (conn, mut flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.atomic(|resp| {
            resp.write("a").write("b");
        });

        let first = flusher.receiver.recv().await.unwrap();
        assert_eq!(
            first,
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n1\r\na\r\n1\r\nb\r\n"
        );

        resp.send(());
        assert_eq!(wire(flusher, client).await, "0\r\n\r\n");
    }

    #[tokio::test]
    async fn upgrade_handshake() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);
        let (socket, upgraded) = oneshot::channel();

        let headers = RequestHeaders::from_pairs([
            ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("Sec-WebSocket-Protocol", "chat, superchat"),
            ("Sec-WebSocket-Extensions", "permessage-deflate"),
        ]);
        let mut resp = response(conn, headers).with_upgrade_socket(socket);

        assert_eq!(resp.upgrade("user-1".into()), Ok(true));
        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: Upgrade\r\n\
             sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
             sec-websocket-protocol: chat\r\n\r\n"
        );
        assert_eq!(
            upgraded.await.unwrap(),
            Upgraded {
                user_data: "user-1".into(),
                key: Some("dGhlIHNhbXBsZSBub25jZQ==".into()),
                protocol: Some("chat, superchat".into()),
                extensions: Some("permessage-deflate".into()),
            }
        );
    }

    #[tokio::test]
    async fn write_error_aborts_response() {
        let (client, server) = duplex(64);
        let (conn, flusher) = Conn::new(server);
        drop(client);

        let mut resp = response(conn, RequestHeaders::new());
        resp.write("first");

        let err = flusher.run().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        assert!(resp.is_aborted());
        assert!(!resp.send("never"));
    }

    #[tokio::test]
    async fn close_before_registration() {
        let (_client, server) = duplex(64);
        let (conn, _flusher) = Conn::new(server);
        let closer = conn.closer();

        closer.close();
        assert!(closer.is_closed());

        let resp = response(conn, RequestHeaders::new());
        assert!(resp.is_aborted());
    }

    #[tokio::test]
    async fn close_after_registration() {
        let (_client, server) = duplex(64);
        let (conn, _flusher) = Conn::new(server);
        let closer = conn.closer();

        let mut resp = response(conn, RequestHeaders::new());
        resp.status(200).unwrap();
        closer.close();
        closer.close();

        assert!(resp.is_completed());
        assert!(!resp.send("x"));
    }

    #[tokio::test]
    async fn handler_content_length_is_kept() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.header("Content-Length", 2)
            .header("transfer-encoding", "chunked")
            .header("content-length", 10)
            .send("hi");

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[tokio::test]
    async fn handler_content_length_with_writes() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.header("content-length", 4).write("ab").send("cd");

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nabcd"
        );
    }

    #[tokio::test]
    async fn handler_transfer_encoding_is_kept() {
        let (client, server) = duplex(4096);
        let (conn, flusher) = Conn::new(server);

        let mut resp = response(conn, RequestHeaders::new());
        resp.header("transfer-encoding", "chunked").send("hi");

        assert_eq!(
            wire(flusher, client).await,
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn bodiless_statuses() {
        let cases = [
            (204, "204 No Content"),
            (304, "304 Not Modified"),
            (103, "103 Early Hints"),
        ];

        for (code, line) in cases {
            let (client, server) = duplex(4096);
            let (conn, flusher) = Conn::new(server);

            let mut resp = response(conn, RequestHeaders::new());
            resp.status(code).unwrap().send("ignored");

            assert_eq!(wire(flusher, client).await, format!("HTTP/1.1 {line}\r\n\r\n"));
        }
    }

    #[test]
    fn bodiless_detection() {
        assert!(is_bodiless(b"204 No Content"));
        assert!(is_bodiless(b"100 Continue"));
        assert!(!is_bodiless(b"200 OK"));
        assert!(!is_bodiless(b"2040 "));
        assert!(!is_bodiless(b"799 "));
    }

    #[test]
    fn accept_key() {
        assert_eq!(
            derive_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(first_protocol(" , graphql-ws, chat"), Some("graphql-ws"));
        assert_eq!(first_protocol(""), None);
    }
}
