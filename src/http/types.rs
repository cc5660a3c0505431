//! Static lookup data: status reason phrases and MIME types

// TO LOWER CASE

#[rustfmt::skip]
const ASCII_TABLE: [u8; 256] = [
    //   x0    x1    x2    x3    x4    x5    x6    x7    x8    x9    xA    xB    xC    xD    xE    xF
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, // 0x
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, // 1x
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, // 2x
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, // 3x
    0x40, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 4x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, // 5x
    0x60, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 6x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // 7x
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F, // 8x
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F, // 9x
    0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, // Ax
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, // Bx
    0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF, // Cx
    0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF, // Dx
    0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF, // Ex
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF, // Fx
];

#[inline(always)]
pub(crate) fn to_lower_case(src: &mut [u8]) {
    for byte in src.iter_mut() {
        *byte = ASCII_TABLE[*byte as usize];
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($( $name:ident = ($num:expr, $str:expr); )+) => {
        /// HTTP status codes with a known reason phrase.
        ///
        /// [`Response::status`](crate::Response::status) accepts raw codes
        /// too; this enum only names the codes the phrase table knows.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $name = $num,
        )+ }

        impl StatusCode {
            /// Looks up a known status code.
            #[inline]
            pub const fn from_u16(code: u16) -> Option<Self> {
                match code { $(
                    $num => Some(StatusCode::$name),
                )+ _ => None }
            }

            /// Reason phrase, e.g. `"Not Found"`.
            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }
        }
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");
    Processing = (102, "Processing");
    EarlyHints = (103, "Early Hints");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NonAuthoritativeInformation = (203, "Non-Authoritative Information");
    NoContent = (204, "No Content");
    ResetContent = (205, "Reset Content");
    PartialContent = (206, "Partial Content");
    MultiStatus = (207, "Multi-Status");
    AlreadyReported = (208, "Already Reported");
    ImUsed = (226, "IM Used");

    MultipleChoices = (300, "Multiple Choices");
    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    UseProxy = (305, "Use Proxy");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    PaymentRequired = (402, "Payment Required");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    ProxyAuthenticationRequired = (407, "Proxy Authentication Required");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    LengthRequired = (411, "Length Required");
    PreconditionFailed = (412, "Precondition Failed");
    PayloadTooLarge = (413, "Payload Too Large");
    UriTooLong = (414, "URI Too Long");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    RangeNotSatisfiable = (416, "Range Not Satisfiable");
    ExpectationFailed = (417, "Expectation Failed");
    ImaTeapot = (418, "I'm a teapot");
    MisdirectedRequest = (421, "Misdirected Request");
    UnprocessableEntity = (422, "Unprocessable Entity");
    Locked = (423, "Locked");
    FailedDependency = (424, "Failed Dependency");
    TooEarly = (425, "Too Early");
    UpgradeRequired = (426, "Upgrade Required");
    PreconditionRequired = (428, "Precondition Required");
    TooManyRequests = (429, "Too Many Requests");
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");
    UnavailableForLegalReasons = (451, "Unavailable For Legal Reasons");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
    VariantAlsoNegotiates = (506, "Variant Also Negotiates");
    InsufficientStorage = (507, "Insufficient Storage");
    LoopDetected = (508, "Loop Detected");
    NotExtended = (510, "Not Extended");
    NetworkAuthenticationRequired = (511, "Network Authentication Required");
}

impl From<StatusCode> for u16 {
    #[inline]
    fn from(status: StatusCode) -> u16 {
        status as u16
    }
}

/// Anything [`Response::status`](crate::Response::status) accepts.
///
/// Implemented for [`StatusCode`], `u16` and `i32`, so both
/// `status(StatusCode::NotFound)` and `status(404)` work. Values outside
/// the `u16` range are written as `0`.
pub trait IntoStatusCode {
    fn into_code(self) -> u16;
}

impl IntoStatusCode for StatusCode {
    #[inline]
    fn into_code(self) -> u16 {
        self as u16
    }
}

impl IntoStatusCode for u16 {
    #[inline]
    fn into_code(self) -> u16 {
        self
    }
}

impl IntoStatusCode for i32 {
    #[inline]
    fn into_code(self) -> u16 {
        u16::try_from(self).unwrap_or(0)
    }
}

/// Reason phrase for `code`, or `None` when the table has no entry.
#[inline]
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    StatusCode::from_u16(code).map(|status| status.reason())
}

/// Renders `"<code> <reason>"` into `buffer`, the form expected by
/// [`Connection::write_status`](crate::Connection::write_status).
///
/// Unmapped codes are written with an empty reason (`"799 "`).
#[inline]
pub(crate) fn write_status_line(code: u16, buffer: &mut Vec<u8>) {
    let mut digits = itoa::Buffer::new();
    buffer.extend_from_slice(digits.format(code).as_bytes());
    buffer.push(b' ');
    if let Some(reason) = reason_phrase(code) {
        buffer.extend_from_slice(reason.as_bytes());
    }
}

// MIME

/// Content type used when a key has no table entry.
pub const DEFAULT_MIME: &str = "text/plain";

#[rustfmt::skip]
const MIME_TABLE: &[(&str, &str)] = &[
    ("aac", "audio/aac"),
    ("avif", "image/avif"),
    ("bin", "application/octet-stream"),
    ("bmp", "image/bmp"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/vnd.microsoft.icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("jsonld", "application/ld+json"),
    ("map", "application/json"),
    ("md", "text/markdown"),
    ("mjs", "text/javascript"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("oga", "audio/ogg"),
    ("ogv", "video/ogg"),
    ("otf", "font/otf"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("text", "text/plain"),
    ("ttf", "font/ttf"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("wav", "audio/wav"),
    ("weba", "audio/webm"),
    ("webm", "video/webm"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("xhtml", "application/xhtml+xml"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
];

/// Resolves a MIME key (file extension, optional leading `.`, any case).
///
/// ```
/// use maker_reply::mime;
///
/// assert_eq!(mime("json"), Some("application/json"));
/// assert_eq!(mime(".HTML"), Some("text/html"));
/// assert_eq!(mime("unknown"), None);
/// ```
pub fn mime(key: &str) -> Option<&'static str> {
    let key = key.strip_prefix('.').unwrap_or(key);
    if key.is_empty() || key.len() > 8 {
        return None;
    }

    let mut lower = [0u8; 8];
    let lower = &mut lower[..key.len()];
    lower.copy_from_slice(key.as_bytes());
    to_lower_case(lower);

    MIME_TABLE
        .binary_search_by(|(ext, _)| ext.as_bytes().cmp(lower))
        .ok()
        .map(|index| MIME_TABLE[index].1)
}

/// Like [`mime`], falling back to [`DEFAULT_MIME`].
#[inline]
pub fn mime_or_default(key: &str) -> &'static str {
    mime(key).unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod types_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn status_lines() {
        let cases = [
            (200, "200 OK"),
            (302, "302 Found"),
            (403, "403 Forbidden"),
            (418, "418 I'm a teapot"),
            (799, "799 "),
            (0, "0 "),
        ];

        for (code, expected) in cases {
            let mut buffer = Vec::new();
            write_status_line(code, &mut buffer);
            assert_eq!(str_op(&buffer), expected);
        }
    }

    #[test]
    fn status_enum() {
        assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
        assert_eq!(StatusCode::from_u16(999), None);
        assert_eq!(u16::from(StatusCode::Found), 302);
        assert_eq!(reason_phrase(503), Some("Service Unavailable"));
        assert_eq!(reason_phrase(299), None);
    }

    #[test]
    fn into_code() {
        assert_eq!(StatusCode::Gone.into_code(), 410);
        assert_eq!(204u16.into_code(), 204);
        assert_eq!(404i32.into_code(), 404);
        assert_eq!((-1i32).into_code(), 0);
        assert_eq!(70_000i32.into_code(), 0);
    }

    #[test]
    fn mime_table_is_sorted() {
        for pair in MIME_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{} >= {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime("json"), Some("application/json"));
        assert_eq!(mime("html"), Some("text/html"));
        assert_eq!(mime(".PNG"), Some("image/png"));
        assert_eq!(mime("woff2"), Some("font/woff2"));
        assert_eq!(mime(""), None);
        assert_eq!(mime("."), None);
        assert_eq!(mime("averyverylongkey"), None);

        assert_eq!(mime_or_default("nope"), DEFAULT_MIME);
        assert_eq!(mime_or_default("css"), "text/css");
    }

    #[test]
    fn lower_case() {
        let mut value = *b"Sec-WebSocket-Key";
        to_lower_case(&mut value);
        assert_eq!(str_op(&value), "sec-websocket-key");
    }
}
