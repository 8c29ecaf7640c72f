//! HTTP Digest response computation (RFC 2617 / RFC 7616, MD5 family).

use super::Challenge;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Credentials bound to a Digest challenge.
///
/// The challenge parameters are fixed at construction. The only state that
/// moves is the nonce count, which increases with every authorized request.
pub struct DigestAuth {
    user: String,
    pass: String,
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: Algorithm,
    qop: Option<String>,
    nonce_count: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Sess,
}

impl DigestAuth {
    /// Binds `user`/`pass` to the parameters of a Digest challenge.
    pub fn new(user: impl Into<String>, pass: impl Into<String>, challenge: &Challenge) -> Self {
        let algorithm = match challenge.param("algorithm") {
            Some(a) if a.eq_ignore_ascii_case("MD5-sess") => Algorithm::Md5Sess,
            _ => Algorithm::Md5,
        };

        // Only qop=auth is answered; without it the legacy RFC 2069 form is used.
        let qop = challenge.param("qop").and_then(|offered| {
            offered
                .split(',')
                .map(str::trim)
                .find(|q| q.eq_ignore_ascii_case("auth"))
                .map(str::to_string)
        });

        Self {
            user: user.into(),
            pass: pass.into(),
            realm: challenge.param("realm").unwrap_or_default().to_string(),
            nonce: challenge.param("nonce").unwrap_or_default().to_string(),
            opaque: challenge.param("opaque").map(str::to_string),
            algorithm,
            qop,
            nonce_count: AtomicU32::new(0),
        }
    }

    /// The user name sent as `username`.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The password the response hash is computed from.
    pub fn pass(&self) -> &str {
        &self.pass
    }

    /// The realm echoed from the challenge.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Builds the `Authorization` header value for `method` on `uri`.
    pub fn authorization(&self, method: &str, uri: &str) -> String {
        let nc = self.nonce_count.fetch_add(1, Ordering::Relaxed) + 1;
        let cnonce = format!("{:016x}", rand::thread_rng().gen::<u64>());
        self.authorization_with(method, uri, nc, &cnonce)
    }

    fn authorization_with(&self, method: &str, uri: &str, nc: u32, cnonce: &str) -> String {
        let nc = format!("{:08x}", nc);
        let response = self.response(method, uri, &nc, cnonce);

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
            self.user, self.realm, self.nonce, uri, response
        );
        if let Some(qop) = &self.qop {
            header.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc, cnonce));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        if self.algorithm == Algorithm::Md5Sess {
            header.push_str(", algorithm=MD5-sess");
        }
        header
    }

    fn response(&self, method: &str, uri: &str, nc: &str, cnonce: &str) -> String {
        let mut ha1 = hex_md5(&format!("{}:{}:{}", self.user, self.realm, self.pass));
        if self.algorithm == Algorithm::Md5Sess {
            ha1 = hex_md5(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = hex_md5(&format!("{}:{}", method, uri));

        match &self.qop {
            Some(qop) => hex_md5(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, self.nonce, nc, cnonce, qop, ha2
            )),
            None => hex_md5(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }
}

impl fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("user", &self.user)
            .field("realm", &self.realm)
            .field("algorithm", &self.algorithm)
            .field("qop", &self.qop)
            .finish_non_exhaustive()
    }
}

fn hex_md5(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
