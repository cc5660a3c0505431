//! Read-only view of the originating request's headers.

use crate::http::types::to_lower_case;

/// Case-insensitive header mapping of the request a
/// [`Response`](crate::Response) answers.
///
/// Names are stored lowercased; lookups lowercase the probe the same way.
/// When a name repeats, [`get`](RequestHeaders::get) returns the first value.
///
/// # Examples
/// ```
/// use maker_reply::RequestHeaders;
///
/// let headers = RequestHeaders::from_pairs([
///     ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
///     ("Sec-WebSocket-Protocol", "chat, superchat"),
/// ]);
///
/// assert_eq!(headers.get("sec-websocket-key"), Some("dGhlIHNhbXBsZSBub25jZQ=="));
/// assert_eq!(headers.websocket_protocol(), Some("chat, superchat"));
/// assert_eq!(headers.websocket_extensions(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(Box<str>, Box<str>)>,
}

impl RequestHeaders {
    /// An empty mapping.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from string pairs.
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(name, value)| {
                (
                    name.as_ref().to_ascii_lowercase().into_boxed_str(),
                    value.as_ref().into(),
                )
            })
            .collect();

        Self { entries }
    }

    /// Builds the mapping from raw header bytes as handed over by a parser.
    ///
    /// Returns `None` if any name or value is not valid UTF-8.
    pub fn from_raw<'a, I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let mut entries = Vec::new();

        for (name, value) in pairs {
            let mut name = name.to_vec();
            to_lower_case(&mut name);

            let name = simdutf8::basic::from_utf8(&name).ok()?;
            let value = simdutf8::basic::from_utf8(value).ok()?;
            entries.push((name.into(), value.into()));
        }

        Some(Self { entries })
    }

    /// Value of the first header called `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| &**value)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(lowercased name, value)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (&**name, &**value))
    }

    #[inline]
    pub fn websocket_key(&self) -> Option<&str> {
        self.get("sec-websocket-key")
    }

    #[inline]
    pub fn websocket_protocol(&self) -> Option<&str> {
        self.get("sec-websocket-protocol")
    }

    #[inline]
    pub fn websocket_extensions(&self) -> Option<&str> {
        self.get("sec-websocket-extensions")
    }
}

impl<N: AsRef<str>, V: AsRef<str>> FromIterator<(N, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
