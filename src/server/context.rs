use crate::{config::ResponseConfig, errors::Error, http::response::Response, Connection, StatusCode};
use std::fmt;

/// Receives errors routed through [`Response::throw_error`].
///
/// The response core never renders or logs errors itself; the sink
/// decides. Closures `Fn(Error, &mut Response<C>)` are sinks too.
///
/// # Examples
/// ```
/// use maker_reply::{Context, Error, RecordingConnection, Response};
///
/// let context = Context::<RecordingConnection>::builder()
///     .error_sink(|err: Error, resp: &mut Response<RecordingConnection>| {
///         let status = if err.is_misuse() { 500 } else { 502 };
///         if let Ok(resp) = resp.status(status) {
///             resp.send(err.to_string());
///         }
///     })
///     .build();
/// # let _ = context;
/// ```
pub trait ErrorSink<C: Connection>: Send + Sync + 'static {
    /// Handles `error` raised while answering the request behind `response`.
    ///
    /// The request headers are available through
    /// [`Response::request_headers`].
    fn on_error(&self, error: Error, response: &mut Response<C>);
}

impl<C, F> ErrorSink<C> for F
where
    C: Connection,
    F: Fn(Error, &mut Response<C>) + Send + Sync + 'static,
{
    #[inline]
    fn on_error(&self, error: Error, response: &mut Response<C>) {
        self(error, response)
    }
}

/// Default sink: logs the error and, if the response is still open,
/// finishes it.
///
/// A response that has not written anything yet gets
/// `500 Internal Server Error` with a plain-text body; one that already
/// started is ended as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl<C: Connection> ErrorSink<C> for LogErrorSink {
    fn on_error(&self, error: Error, response: &mut Response<C>) {
        log::error!("request failed: {error}");

        if response.is_clean() {
            if let Ok(resp) = response.status(StatusCode::InternalServerError) {
                resp.content_type("txt").send("Internal Server Error");
            }
        } else {
            response.send(());
        }
    }
}

/// Session state attached to one request.
///
/// [`Response::send`] calls [`perform_closure`](Session::perform_closure)
/// once, before the response is sealed, when [`is_ready`](Session::is_ready)
/// is `true`. That is the point to persist the session and write its cookie.
///
/// ```
/// use maker_reply::{Context, RecordingConnection, Response, Session};
///
/// struct CookieSession {
///     id: String,
/// }
///
/// impl Session<RecordingConnection> for CookieSession {
///     fn is_ready(&self) -> bool {
///         true
///     }
///
///     fn perform_closure(
///         &mut self,
///         response: &mut Response<RecordingConnection>,
///         _: &Context<RecordingConnection>,
///     ) {
///         response.cookie("sid", &self.id, None, None, true);
///     }
/// }
///
/// let mut resp = Response::bare(RecordingConnection::new())
///     .with_session(CookieSession { id: "42".into() });
/// resp.send("ok");
///
/// assert_eq!(resp.raw().headers("set-cookie"), ["sid=42; Path=/; Secure; SameSite=None"]);
/// ```
pub trait Session<C: Connection> {
    fn is_ready(&self) -> bool;

    fn perform_closure(&mut self, response: &mut Response<C>, context: &Context<C>);
}

/// Process-wide dependencies shared by every [`Response`].
///
/// Wrap it in an [`Arc`](std::sync::Arc) once and pass clones to
/// [`Response::new`].
pub struct Context<C: Connection> {
    error_sink: Box<dyn ErrorSink<C>>,
    config: ResponseConfig,
}

impl<C: Connection> Context<C> {
    /// Creates a new builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use maker_reply::{config::ResponseConfig, Context, LogErrorSink, RecordingConnection};
    /// use std::sync::Arc;
    ///
    /// let context: Arc<Context<RecordingConnection>> = Arc::new(
    ///     Context::builder()
    ///         .error_sink(LogErrorSink)
    ///         .config(ResponseConfig::default())
    ///         .build(),
    /// );
    /// # let _ = context;
    /// ```
    #[inline]
    pub fn builder() -> ContextBuilder<C> {
        ContextBuilder {
            error_sink: None,
            config: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    #[inline]
    pub fn error_sink(&self) -> &dyn ErrorSink<C> {
        &*self.error_sink
    }
}

impl<C: Connection> Default for Context<C> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<C: Connection> fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`]. Every setting is optional.
pub struct ContextBuilder<C: Connection> {
    error_sink: Option<Box<dyn ErrorSink<C>>>,
    config: Option<ResponseConfig>,
}

impl<C: Connection> ContextBuilder<C> {
    /// Sets the error sink (default: [`LogErrorSink`]).
    #[inline(always)]
    pub fn error_sink<E: ErrorSink<C>>(mut self, sink: E) -> Self {
        self.error_sink = Some(Box::new(sink));
        self
    }

    /// Sets the response configuration (default: [`ResponseConfig::default`]).
    #[inline(always)]
    pub fn config(mut self, config: ResponseConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[inline]
    pub fn build(self) -> Context<C> {
        Context {
            error_sink: self.error_sink.unwrap_or_else(|| Box::new(LogErrorSink)),
            config: self.config.unwrap_or_default(),
        }
    }
}
