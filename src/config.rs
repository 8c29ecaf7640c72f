//! Serializable client configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Client settings as they appear in a configuration file.
///
/// Feed it to [`ClientBuilder::from_config`](crate::ClientBuilder::from_config).
///
/// # Examples
///
/// ```
/// use davcall::{ClientBuilder, ClientConfig};
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "root": "https://dav.example.com/webdav/",
///     "username": "alice",
///     "password": "secret",
///     "timeout_secs": 30,
///     "headers": { "User-Agent": "my-sync/1.0" }
/// }"#).unwrap();
///
/// let client = ClientBuilder::from_config(&config).unwrap().build().unwrap();
/// assert_eq!(client.root().as_str(), "https://dav.example.com/webdav/");
/// ```
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the WebDAV tree.
    pub root: String,
    /// User offered on challenge. Empty means none.
    #[serde(default)]
    pub username: String,
    /// Password for `username`. Redacted from `Debug` output.
    #[serde(default)]
    pub password: String,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("root", &self.root)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("headers", &self.headers)
            .finish()
    }
}
