//! `Set-Cookie` construction and signing.
//!
//! Signed values use the widespread `value.signature` layout, where
//! `signature` is the unpadded standard base64 of HMAC-SHA256 over the
//! value, so cookies stay readable by other stacks sharing the secret.
//!
//! Names must be RFC 6265 tokens and values cookie-octets; `Domain` and
//! `Path` may not contain `;` or control characters. Anything else is
//! refused with [`Error::InvalidCookie`].

use crate::errors::Error;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::{
    borrow::Cow,
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

type HmacSha256 = Hmac<Sha256>;

// Everything `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// Latest instant `httpdate` renders: 9999-12-31T23:59:59Z.
const MAX_HTTP_DATE: u64 = 253_402_300_799;

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of one `Set-Cookie` header.
///
/// [`Default`] yields `Secure; SameSite=None; Path=/` with value encoding
/// on. [`CookieOptions::empty`] yields no attributes at all.
///
/// `expires` is normally left alone: [`Response::cookie`](crate::Response::cookie)
/// derives it from its `expiry` argument and overwrites whatever is here.
#[derive(Clone, PartialEq)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    /// Lifetime in seconds; `Some(0)` asks the agent to drop the cookie.
    pub max_age: Option<i64>,
    /// HMAC key. Signing happens only when this is a non-empty string.
    pub secret: Option<String>,
    /// Percent-encode the value. Forced off for signed values.
    pub encode: bool,
    pub expires: Option<SystemTime>,
}

impl CookieOptions {
    /// Options with no attributes and value encoding on.
    pub fn empty() -> Self {
        Self {
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: None,
            max_age: None,
            secret: None,
            encode: true,
            expires: None,
        }
    }

    #[inline]
    pub(crate) fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|secret| !secret.is_empty())
    }
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".into()),
            secure: true,
            same_site: Some(SameSite::None),
            ..Self::empty()
        }
    }
}

impl fmt::Debug for CookieOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieOptions")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("same_site", &self.same_site)
            .field("max_age", &self.max_age)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("encode", &self.encode)
            .field("expires", &self.expires)
            .finish()
    }
}

/// Serializes one cookie into a `Set-Cookie` header value.
///
/// Attribute order: `Expires`, `Max-Age`, `Domain`, `Path`, `Secure`,
/// `HttpOnly`, `SameSite`. `Expires` is clamped to the range an HTTP date
/// can express.
///
/// ```
/// use maker_reply::{cookie, CookieOptions, Error, SameSite};
///
/// let options = CookieOptions {
///     max_age: Some(3600),
///     http_only: true,
///     same_site: Some(SameSite::Lax),
///     ..CookieOptions::empty()
/// };
///
/// assert_eq!(
///     cookie::serialize("theme", "dark mode", &options)?,
///     "theme=dark%20mode; Max-Age=3600; HttpOnly; SameSite=Lax"
/// );
/// assert_eq!(
///     cookie::serialize("bad name", "v", &options),
///     Err(Error::InvalidCookie("name"))
/// );
/// # Ok::<(), Error>(())
/// ```
///
/// # Errors
/// [`Error::InvalidCookie`] naming the offending part.
pub fn serialize(name: &str, value: &str, options: &CookieOptions) -> Result<String, Error> {
    if !is_token(name) {
        return Err(Error::InvalidCookie("name"));
    }
    let value: Cow<'_, str> = match options.encode {
        true => utf8_percent_encode(value, URI_COMPONENT).into(),
        false => value.into(),
    };
    if !is_cookie_value(&value) {
        return Err(Error::InvalidCookie("value"));
    }
    if !options.domain.as_deref().map_or(true, is_attribute_value) {
        return Err(Error::InvalidCookie("domain"));
    }
    if !options.path.as_deref().map_or(true, is_attribute_value) {
        return Err(Error::InvalidCookie("path"));
    }

    let mut out = String::with_capacity(name.len() + value.len() + 64);

    out.push_str(name);
    out.push('=');
    out.push_str(&value);

    if let Some(expires) = options.expires {
        out.push_str("; Expires=");
        out.push_str(&http_date(expires));
    }
    if let Some(max_age) = options.max_age {
        out.push_str("; Max-Age=");
        out.push_str(itoa::Buffer::new().format(max_age));
    }
    if let Some(domain) = &options.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    if let Some(path) = &options.path {
        out.push_str("; Path=");
        out.push_str(path);
    }
    if options.secure {
        out.push_str("; Secure");
    }
    if options.http_only {
        out.push_str("; HttpOnly");
    }
    if let Some(same_site) = options.same_site {
        out.push_str("; SameSite=");
        out.push_str(same_site.as_str());
    }

    Ok(out)
}

fn http_date(time: SystemTime) -> String {
    let latest = UNIX_EPOCH + Duration::from_secs(MAX_HTTP_DATE);
    httpdate::fmt_http_date(time.clamp(UNIX_EPOCH, latest))
}

// tchar from RFC 9110.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

// cookie-value from RFC 6265, optionally wrapped in double quotes.
fn is_cookie_value(value: &str) -> bool {
    let inner = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value);

    inner
        .bytes()
        .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

fn is_attribute_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii() && !b.is_ascii_control() && b != b';')
}

#[inline]
fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Signs `value` with `secret`, producing `value.signature`.
///
/// ```
/// use maker_reply::cookie::{sign, unsign};
///
/// let signed = sign("user-42", "keyboard cat");
/// assert!(signed.starts_with("user-42."));
/// assert_eq!(unsign(&signed, "keyboard cat"), Some("user-42"));
/// assert_eq!(unsign(&signed, "other secret"), None);
/// ```
pub fn sign(value: &str, secret: &str) -> String {
    let mut mac = mac(secret);
    mac.update(value.as_bytes());
    let tag = mac.finalize().into_bytes();

    let mut out = String::with_capacity(value.len() + 44);
    out.push_str(value);
    out.push('.');
    STANDARD_NO_PAD.encode_string(tag, &mut out);
    out
}

/// Verifies a value produced by [`sign`] and returns the original value.
///
/// The signature is checked in constant time.
pub fn unsign<'a>(signed: &'a str, secret: &str) -> Option<&'a str> {
    let (value, signature) = signed.rsplit_once('.')?;
    let tag = STANDARD_NO_PAD.decode(signature).ok()?;

    let mut mac = mac(secret);
    mac.update(value.as_bytes());
    mac.verify_slice(&tag).ok()?;

    Some(value)
}

/// Runs the cookie pipeline: expiry derivation, optional signing,
/// serialization.
pub(crate) fn build(
    name: &str,
    value: &str,
    expiry: Option<Duration>,
    mut options: CookieOptions,
    sign_cookie: bool,
    now: SystemTime,
) -> Result<String, Error> {
    options.expires = expiry.and_then(|expiry| now.checked_add(expiry));

    match options.signing_secret().filter(|_| sign_cookie) {
        Some(secret) => {
            let signed = sign(value, secret);
            options.encode = false;
            serialize(name, &signed, &options)
        }
        None => serialize(name, value, &options),
    }
}
