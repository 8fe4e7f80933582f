//! Mail Library
//!
//! A compact SMTP client (RFC 5321) with PLAIN and CRAM-MD5 authentication.
//! This is the compiled library the `net/smtp` unit exposes to interpreted
//! programs.
//!
//! # Example
//!
//! ```rust,ignore
//! use neurlang_bridge::mail::{plain_auth, send_mail};
//!
//! let auth = plain_auth("", "user", "secret", "mail.example.com");
//! send_mail(
//!     "mail.example.com:25",
//!     Some(&auth),
//!     "alice@example.com",
//!     &["bob@example.com".to_string()],
//!     b"Subject: hi\r\n\r\nhello\r\n",
//! )?;
//! ```

mod auth;
mod client;

use thiserror::Error;

pub use auth::{cram_md5_auth, plain_auth, Auth, CramMd5Auth, PlainAuth};
pub use client::{dial, send_mail, Client, Conn};

/// Version of the library API surface the registration units track
pub const API_VERSION: &str = "0.1";

/// Errors produced by the SMTP client
#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("smtp: {0}")]
    Io(#[from] std::io::Error),

    /// Reply with an unexpected status code
    #[error("{code} {message}")]
    Protocol { code: u16, message: String },

    #[error("smtp: malformed reply: {0:?}")]
    MalformedReply(String),

    #[error("smtp: base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unencrypted connection")]
    UnencryptedConnection,

    #[error("wrong host name")]
    WrongHost,

    #[error("unexpected server challenge")]
    UnexpectedChallenge,

    #[error("smtp: A line must not contain CR or LF")]
    InvalidLine,

    #[error("smtp: server doesn't support AUTH")]
    NoAuth,

    #[error("smtp: Hello called after other methods")]
    HelloAfterCommands,

    /// Error raised by a caller-supplied [`Auth`] implementation
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

/// What an [`Auth`] mechanism learns about the server before authenticating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// SMTP server name
    pub name: String,
    /// Whether the connection is encrypted
    pub tls: bool,
    /// Advertised authentication mechanisms
    pub auth: Vec<String>,
}
