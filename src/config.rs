//! Response configuration shared by every [`Response`](crate::Response)
//! created from one [`Context`](crate::Context).
//!
//! # Examples
//!
//! ```
//! use maker_reply::{config::ResponseConfig, CookieOptions, Context, RecordingConnection};
//!
//! let context = Context::<RecordingConnection>::builder()
//!     .config(ResponseConfig {
//!         default_capacity: 4 * 1024,
//!         cookie_defaults: CookieOptions {
//!             http_only: true,
//!             ..CookieOptions::default()
//!         },
//!         ..ResponseConfig::default()
//!     })
//!     .build();
//! # let _ = context;
//! ```

use crate::http::cookie::CookieOptions;

/// Scratch buffer sizing and per-call defaults.
///
/// # Buffer management
///
/// Each response owns one scratch buffer used to render status lines,
/// header values and bodies before they are handed to the connection.
/// After a terminal write the buffer is released back to
/// `default_capacity` if it grew past `max_capacity`:
///
/// ```
/// # use maker_reply::config::ResponseConfig;
/// # let config = ResponseConfig::default();
/// # let mut buffer: Vec<u8> = Vec::with_capacity(config.default_capacity);
/// if buffer.capacity() > config.max_capacity {
///     buffer = Vec::with_capacity(config.default_capacity);
/// } else {
///     buffer.clear();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    /// Initial scratch buffer capacity (default: `1024 B`)
    pub default_capacity: usize,
    /// Capacity above which the scratch buffer is reallocated (default: `8192 B`)
    pub max_capacity: usize,

    /// Options used by [`cookie()`](crate::Response::cookie) when the caller
    /// passes `None` (default: `Secure; SameSite=None; Path=/`).
    ///
    /// A fresh clone is taken for every call.
    pub cookie_defaults: CookieOptions,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,
            cookie_defaults: CookieOptions::default(),

            _priv: (),
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use crate::SameSite;

    #[test]
    fn defaults() {
        let config = ResponseConfig::default();

        assert_eq!(config.default_capacity, 1024);
        assert_eq!(config.max_capacity, 8192);
        assert!(config.cookie_defaults.secure);
        assert_eq!(config.cookie_defaults.same_site, Some(SameSite::None));
        assert_eq!(config.cookie_defaults.path.as_deref(), Some("/"));
    }
}
