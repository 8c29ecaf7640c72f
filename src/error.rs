//! Error types for WebDAV calls.
//!
//! Errors come in two tiers. Transport errors (connection failures, timeouts,
//! I/O on the request body, malformed URLs) are propagated unchanged and never
//! retried. Protocol errors carry the operation, the path and the HTTP status
//! code that fell outside the success set of that operation.

use http::StatusCode;

/// The main error type for WebDAV calls.
///
/// # Examples
///
/// ```no_run
/// use davcall::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .root("https://dav.example.com/remote.php/webdav/")?
///     .credentials("alice", "secret")
///     .build()?;
///
/// match client.copy("notes.txt", "archive/notes.txt", false).await {
///     Ok(()) => println!("copied"),
///     Err(Error::Protocol { op, path, status }) => {
///         eprintln!("{op} {path} failed with {status}");
///     }
///     Err(Error::PartialFailure { failures, .. }) => {
///         for failure in failures {
///             eprintln!("{} -> {}", failure.href, failure.status);
///         }
///     }
///     Err(e) => eprintln!("transport error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, TLS, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Reading or rewinding the request body failed.
    #[error("Body I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a status code outside the success set of `op`.
    ///
    /// # Fields
    ///
    /// * `op` - The operation name (`"Authorize"`, `"PROPFIND"`, `"MOVE"`, ...)
    /// * `path` - The path the operation was applied to
    /// * `status` - The observed HTTP status code
    #[error("{op} {path}: {status}")]
    Protocol {
        /// The operation that failed
        op: String,
        /// The path the operation targeted
        path: String,
        /// The HTTP status code returned by the server
        status: StatusCode,
    },

    /// A COPY or MOVE over a collection reported `207 Multi-Status` with
    /// failures for some of the member resources.
    #[error("{op} {path}: partial failure on {} resource(s)", failures.len())]
    PartialFailure {
        /// The operation that partially failed
        op: String,
        /// The source path of the operation
        path: String,
        /// Per-resource failures extracted from the multistatus body
        failures: Vec<ResourceFailure>,
    },

    /// The multistatus response body could not be parsed.
    #[error("Malformed multistatus body: {0}")]
    Xml(String),

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how the client or request was configured,
    /// such as an invalid header value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One member resource that failed inside a `207 Multi-Status` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    /// The `href` of the failing resource as reported by the server.
    pub href: String,
    /// The status reported for that resource.
    pub status: StatusCode,
}

impl Error {
    pub(crate) fn protocol(
        op: impl Into<String>,
        path: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Error::Protocol {
            op: op.into(),
            path: path.into(),
            status,
        }
    }

    /// Maps a `reqwest` error to [`Error::Timeout`] when it was caused by the
    /// configured timeout, and to [`Error::Network`] otherwise.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }

    /// Returns the HTTP status code if this is a protocol error.
    ///
    /// # Examples
    ///
    /// ```
    /// use davcall::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::Protocol {
    ///     op: "PROPFIND".to_string(),
    ///     path: "/docs".to_string(),
    ///     status: StatusCode::NOT_FOUND,
    /// };
    /// assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    /// assert!(Error::Timeout.status().is_none());
    /// ```
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Protocol { status, .. } => Some(*status),
            Error::PartialFailure { .. } => Some(StatusCode::MULTI_STATUS),
            _ => None,
        }
    }

    /// Returns `true` for errors raised from a response the server did send.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. } | Error::PartialFailure { .. } | Error::Xml(_)
        )
    }

    /// Returns `true` for errors that happened before or while talking to the
    /// server (network, timeout, body I/O).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout | Error::Io(_))
    }

    /// Returns `true` if the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// A specialized `Result` type for WebDAV calls.
pub type Result<T> = std::result::Result<T, Error>;
