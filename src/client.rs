//! WebDAV client and request executor.
//!
//! The [`Client`] type is the main entry point. Use [`ClientBuilder`] to
//! configure and create clients. Every WebDAV verb goes through
//! [`Client::execute`], which authorizes the request, sends it, and on a
//! challenge upgrades the shared authenticator and replays the request once.

use crate::{
    auth::{AuthScheme, Authenticator, Challenge},
    body::RequestBody,
    config::ClientConfig,
    path, Error, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

/// Observes every outgoing request right before it is sent.
///
/// Interceptors are for logging and tracing; they get a shared reference and
/// cannot change the request.
pub type Interceptor = Arc<dyn Fn(&Method, &reqwest::Request) + Send + Sync>;

/// Adds verb-specific headers to a request before it is sent.
pub type HeaderHook<'a> = &'a (dyn Fn(&mut HeaderMap) + Send + Sync);

/// A WebDAV client rooted at a base URL.
///
/// The client is cheap to clone and designed to be shared by concurrent
/// tasks. It maintains a connection pool and the authenticator negotiated
/// with the server, which all clones share.
///
/// # Examples
///
/// ```no_run
/// use davcall::Client;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), davcall::Error> {
/// let client = Client::builder()
///     .root("https://dav.example.com/remote.php/webdav/")?
///     .credentials("alice", "secret")
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// client.mkdir_all("projects/2024").await?;
/// let status = client.put("projects/2024/plan.md", "# Plan").await?;
/// println!("PUT answered {}", status);
///
/// client.rename("projects/2024/plan.md", "archive/plan.md", false).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    root: Url,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    interceptor: Option<Interceptor>,
    auth: Mutex<Arc<Authenticator>>,
}

/// Progress of a single call through authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStep {
    /// No challenge answered yet.
    Unauthenticated,
    /// An upgraded authenticator was installed and the request is replayed.
    Upgraded,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client for `root` that authenticates as `user` once the
    /// server asks for credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a valid URL.
    pub fn new(root: impl AsRef<str>, user: impl Into<String>, pass: impl Into<String>) -> Result<Self> {
        Self::builder().root(root)?.credentials(user, pass).build()
    }

    /// The root URL all paths are joined onto.
    pub fn root(&self) -> &Url {
        &self.inner.root
    }

    /// The scheme of the authenticator currently in use.
    pub fn auth_scheme(&self) -> AuthScheme {
        self.authenticator().scheme()
    }

    /// Replaces the credentials and drops any negotiated authentication.
    ///
    /// The next request goes out anonymously and upgrades again on challenge.
    pub fn set_credentials(&self, user: impl Into<String>, pass: impl Into<String>) {
        self.install(Authenticator::anonymous(user, pass));
    }

    /// Sends a single WebDAV request.
    ///
    /// `path` is joined onto the root and percent-escaped. `mutate` may add
    /// verb-specific headers; it runs after credentials are attached and
    /// before the interceptor.
    ///
    /// An anonymous attempt that is answered with `401` is retried exactly
    /// once with an authenticator built from the `WWW-Authenticate`
    /// challenge. The body is replayed from the start on the retry.
    ///
    /// Any status other than `401` is returned as-is and the caller owns the
    /// response body.
    ///
    /// # Errors
    ///
    /// - transport failures ([`Error::Network`], [`Error::Timeout`]) are
    ///   returned unchanged and never retried,
    /// - [`Error::Io`] if a seekable body cannot be rewound,
    /// - [`Error::Protocol`] with operation `"Authorize"` if the challenge is
    ///   not understood or the upgraded credentials are rejected too.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        mutate: Option<HeaderHook<'_>>,
    ) -> Result<reqwest::Response> {
        let url = path::join(&self.inner.root, path)?;
        let mut replay = body.map(RequestBody::into_replay);
        let mut step = AuthStep::Unauthenticated;
        let mut attempt = 0;

        loop {
            attempt += 1;

            // Read exactly once per attempt; other tasks may swap it meanwhile.
            let auth = self.authenticator();

            let body = match replay.as_mut() {
                Some(replay) => Some(replay.next_attempt().await?),
                None => None,
            };

            let mut request = reqwest::Request::new(method.clone(), url.clone());
            for (name, value) in &self.inner.default_headers {
                request.headers_mut().append(name, value.clone());
            }
            if let Some(timeout) = self.inner.timeout {
                *request.timeout_mut() = Some(timeout);
            }
            if let Some(body) = body {
                *request.body_mut() = Some(body.into());
            }

            auth.authorize(&mut request)?;
            if let Some(mutate) = mutate {
                mutate(request.headers_mut());
            }
            if let Some(interceptor) = &self.inner.interceptor {
                interceptor(&method, &request);
            }

            tracing::debug!(
                method = %method,
                url = %url,
                attempt = attempt,
                auth = %auth.scheme(),
                "Executing WebDAV request"
            );

            let response = self
                .inner
                .http_client
                .execute(request)
                .await
                .map_err(Error::from_transport)?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            let challenge = match (step, auth.scheme()) {
                (AuthStep::Unauthenticated, AuthScheme::Anonymous) => {
                    Challenge::from_headers(response.headers())
                }
                _ => None,
            };

            let Some(challenge) = challenge else {
                tracing::warn!(
                    method = %method,
                    url = %url,
                    auth = %auth.scheme(),
                    attempt = attempt,
                    "Authorization rejected"
                );
                return Err(Error::protocol(
                    "Authorize",
                    self.inner.root.as_str(),
                    response.status(),
                ));
            };

            let upgraded = auth.upgrade(&challenge);
            tracing::info!(
                method = %method,
                url = %url,
                auth = %upgraded.scheme(),
                "Server challenged, retrying with upgraded authentication"
            );
            self.install(upgraded);
            step = AuthStep::Upgraded;
        }
    }

    fn authenticator(&self) -> Arc<Authenticator> {
        Arc::clone(&self.lock_auth())
    }

    fn install(&self, auth: Authenticator) {
        *self.lock_auth() = Arc::new(auth);
    }

    fn lock_auth(&self) -> MutexGuard<'_, Arc<Authenticator>> {
        self.inner
            .auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use davcall::ClientBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), davcall::Error> {
/// let client = ClientBuilder::new()
///     .root("https://dav.example.com/webdav/")?
///     .credentials("alice", "secret")
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-sync/1.0")?
///     .interceptor(|method, request| {
///         tracing::trace!(%method, url = %request.url(), "outgoing");
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    root: Option<Url>,
    user: String,
    pass: String,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    interceptor: Option<Interceptor>,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            root: None,
            user: String::new(),
            pass: String::new(),
            default_headers: HeaderMap::new(),
            timeout: None,
            interceptor: None,
            http_client: None,
        }
    }

    /// Starts a builder from a deserialized [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the root URL or one of the headers is invalid.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::new()
            .root(&config.root)?
            .credentials(&config.username, &config.password);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        for (name, value) in &config.headers {
            builder = builder.default_header(name, value)?;
        }
        Ok(builder)
    }

    /// Sets the root URL of the WebDAV tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn root(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.root = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the credentials offered once the server challenges.
    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = user.into();
        self.pass = pass.into();
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.append(name, value);
        Ok(self)
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Installs an interceptor that observes every outgoing request.
    pub fn interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&Method, &reqwest::Request) + Send + Sync + 'static,
    {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Uses a preconfigured `reqwest::Client` (TLS, proxies, pool settings).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no root URL was provided or if the HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<Client> {
        let root = self
            .root
            .ok_or_else(|| Error::ConfigurationError("Root URL is required".to_string()))?;

        if root.cannot_be_a_base() {
            return Err(Error::ConfigurationError(format!(
                "Root URL cannot carry a path: {}",
                root
            )));
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                root,
                default_headers: self.default_headers,
                timeout: self.timeout,
                interceptor: self.interceptor,
                auth: Mutex::new(Arc::new(Authenticator::anonymous(self.user, self.pass))),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_root() {
        let result = Client::builder().build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_build_rejects_opaque_root() {
        let result = Client::builder().root("mailto:dav@example.com").unwrap().build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_starts_anonymous_and_resets() {
        let client = Client::new("http://localhost/dav/", "user", "pass").unwrap();
        assert_eq!(client.auth_scheme(), AuthScheme::Anonymous);

        client.install(
            client
                .authenticator()
                .upgrade(&Challenge::parse("Basic realm=\"x\"").unwrap()),
        );
        assert_eq!(client.auth_scheme(), AuthScheme::Basic);

        client.set_credentials("other", "secret");
        assert_eq!(client.auth_scheme(), AuthScheme::Anonymous);
        assert_eq!(client.authenticator().user(), "other");
    }

    #[test]
    fn test_clones_share_authenticator() {
        let client = Client::new("http://localhost/dav/", "user", "pass").unwrap();
        let clone = client.clone();
        client.install(
            client
                .authenticator()
                .upgrade(&Challenge::parse("Digest nonce=\"n\"").unwrap()),
        );
        assert_eq!(clone.auth_scheme(), AuthScheme::Digest);
    }

    #[test]
    fn test_invalid_default_header() {
        let result = Client::builder().default_header("bad header", "v");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }
}
