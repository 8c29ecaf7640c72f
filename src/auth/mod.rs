//! Authentication strategies.
//!
//! A client starts out [`Authenticator::Anonymous`] while still holding the
//! configured user and password. The first `401` it sees is answered by
//! [`Authenticator::upgrade`], which turns the parsed [`Challenge`] into a
//! Basic or Digest authenticator built from those same credentials.

mod challenge;
mod digest;

pub use challenge::{Challenge, ChallengeScheme};
pub use digest::DigestAuth;

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use std::fmt;

/// The scheme an [`Authenticator`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// No credentials are sent.
    Anonymous,
    /// `Authorization: Basic ...`.
    Basic,
    /// `Authorization: Digest ...`.
    Digest,
}

impl AuthScheme {
    /// The scheme name. Anonymous reports itself as `"NoAuth"`.
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::Anonymous => "NoAuth",
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Produces authorization material for outgoing requests.
///
/// Values are immutable once built; the client swaps whole authenticators
/// rather than editing the one in use.
pub enum Authenticator {
    /// Sends nothing, but remembers the credentials for a later upgrade.
    Anonymous {
        /// User name used once the server challenges.
        user: String,
        /// Password used once the server challenges.
        pass: String,
    },
    /// HTTP Basic.
    Basic {
        /// User name.
        user: String,
        /// Password.
        pass: String,
    },
    /// HTTP Digest, bound to the challenge that created it.
    Digest(DigestAuth),
}

impl Authenticator {
    /// An anonymous authenticator that will upgrade with `user`/`pass`.
    pub fn anonymous(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Authenticator::Anonymous {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// Attaches credentials to `request`.
    ///
    /// The method and the escaped request URI are taken from the request
    /// itself, so this must run after the URL is final.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the credentials cannot be
    /// carried in a header value.
    pub fn authorize(&self, request: &mut reqwest::Request) -> Result<()> {
        let value = match self {
            Authenticator::Anonymous { .. } => return Ok(()),
            Authenticator::Basic { user, pass } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
            }
            Authenticator::Digest(digest) => {
                let url = request.url();
                let uri = match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_string(),
                };
                digest.authorization(request.method().as_str(), &uri)
            }
        };

        let mut value = HeaderValue::try_from(value).map_err(|e| {
            Error::ConfigurationError(format!("Invalid authorization header: {}", e))
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// The scheme this authenticator speaks.
    pub fn scheme(&self) -> AuthScheme {
        match self {
            Authenticator::Anonymous { .. } => AuthScheme::Anonymous,
            Authenticator::Basic { .. } => AuthScheme::Basic,
            Authenticator::Digest(_) => AuthScheme::Digest,
        }
    }

    /// The configured user, kept across upgrades.
    pub fn user(&self) -> &str {
        match self {
            Authenticator::Anonymous { user, .. } | Authenticator::Basic { user, .. } => user,
            Authenticator::Digest(digest) => digest.user(),
        }
    }

    /// The configured password, kept across upgrades.
    pub fn pass(&self) -> &str {
        match self {
            Authenticator::Anonymous { pass, .. } | Authenticator::Basic { pass, .. } => pass,
            Authenticator::Digest(digest) => digest.pass(),
        }
    }

    /// Builds the authenticator answering `challenge` with this
    /// authenticator's credentials.
    pub fn upgrade(&self, challenge: &Challenge) -> Authenticator {
        match challenge.scheme {
            ChallengeScheme::Digest => {
                Authenticator::Digest(DigestAuth::new(self.user(), self.pass(), challenge))
            }
            ChallengeScheme::Basic => Authenticator::Basic {
                user: self.user().to_string(),
                pass: self.pass().to_string(),
            },
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::Digest(digest) => fmt::Debug::fmt(digest, f),
            other => f
                .debug_struct(other.scheme().name())
                .field("user", &other.user())
                .finish_non_exhaustive(),
        }
    }
}
