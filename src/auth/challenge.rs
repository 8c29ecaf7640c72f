//! Parsing of `WWW-Authenticate` challenges.

use http::header::WWW_AUTHENTICATE;
use http::HeaderMap;
use std::collections::HashMap;

/// The authentication scheme a server asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeScheme {
    /// `Basic` (RFC 7617).
    Basic,
    /// `Digest` (RFC 7616).
    Digest,
}

/// A parsed `WWW-Authenticate` challenge.
///
/// Scheme detection is a case-insensitive substring match: a value mentioning
/// `digest` anywhere is a Digest challenge, otherwise one mentioning `basic`
/// is a Basic challenge. Digest wins when both appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The detected scheme.
    pub scheme: ChallengeScheme,
    /// Auth parameters following the scheme token, keyed by lowercase name.
    pub params: HashMap<String, String>,
}

impl Challenge {
    /// Parses a single header value. Returns `None` for unrecognized schemes.
    ///
    /// # Examples
    ///
    /// ```
    /// use davcall::auth::{Challenge, ChallengeScheme};
    ///
    /// let challenge = Challenge::parse(r#"Digest realm="x", nonce="y""#).unwrap();
    /// assert_eq!(challenge.scheme, ChallengeScheme::Digest);
    /// assert_eq!(challenge.param("nonce"), Some("y"));
    ///
    /// assert!(Challenge::parse("Bearer realm=\"api\"").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.to_ascii_lowercase();
        let (scheme, token_at, token_len) = if let Some(at) = lower.find("digest") {
            (ChallengeScheme::Digest, at, "digest".len())
        } else if let Some(at) = lower.find("basic") {
            (ChallengeScheme::Basic, at, "basic".len())
        } else {
            return None;
        };

        Some(Self {
            scheme,
            params: parse_params(&value[token_at + token_len..]),
        })
    }

    /// Picks the challenge to answer from all `WWW-Authenticate` headers of a
    /// response, preferring Digest over Basic.
    ///
    /// Values carrying non-ASCII bytes (a UTF-8 realm, say) are decoded
    /// lossily rather than skipped.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let challenges: Vec<Challenge> = headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| Challenge::parse(&String::from_utf8_lossy(v.as_bytes())))
            .collect();

        challenges
            .iter()
            .find(|c| c.scheme == ChallengeScheme::Digest)
            .or_else(|| challenges.first())
            .cloned()
    }

    /// Returns a challenge parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Parses `key=value, key="quoted, value"` auth-param lists.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            break;
        }

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            // A bare token (e.g. the next scheme name); skip it.
            continue;
        }
        chars.next();
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' || c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        params.insert(key.to_ascii_lowercase(), value);
    }

    params
}
