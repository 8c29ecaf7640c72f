//! # davcall - the request layer of a WebDAV client
//!
//! davcall issues WebDAV requests against a resource tree rooted at a base
//! URL. It is built on top of `reqwest` and takes care of the parts of the
//! protocol that are easy to get subtly wrong:
//!
//! - **Authentication negotiation** - requests start anonymous; on a `401` the
//!   `WWW-Authenticate` challenge decides between Basic and Digest, the shared
//!   authenticator is upgraded and the request is retried exactly once.
//! - **Safe body replay** - the retry sends exactly the bytes of the first
//!   attempt. Seekable bodies are rewound, streams are read only once and
//!   replayed from a capture buffer.
//! - **Verb semantics** - MKCOL treats "already exists" as success,
//!   COPY/MOVE create missing destination parents on `409 Conflict`, PROPFIND
//!   validates `207 Multi-Status` and streams each response to a callback.
//! - **Structured errors** - transport failures and protocol failures
//!   (operation, path, status) are kept apart.
//! - **Logging** - structured events through `tracing`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use davcall::{Client, RequestBody};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), davcall::Error> {
//!     let client = Client::new("https://dav.example.com/webdav/", "alice", "secret")?;
//!     client.connect().await?;
//!
//!     // Creates "photos/" and "photos/2024/" if they are missing.
//!     client.mkdir_all("photos/2024").await?;
//!
//!     let file = tokio::fs::File::open("beach.jpg").await?;
//!     let status = client
//!         .put("photos/2024/beach.jpg", RequestBody::seekable(file))
//!         .await?;
//!     println!("upload answered {}", status);
//!
//!     client
//!         .propfind("photos/2024/", false, davcall::LISTING_PROPS, |entry| {
//!             println!("{} (collection: {})", entry.href, entry.is_collection());
//!             Ok(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use davcall::{Client, Error};
//!
//! # async fn example(client: Client) {
//! match client.rename("draft.md", "published/final.md", false).await {
//!     Ok(()) => println!("moved"),
//!     Err(Error::Protocol { op, path, status }) => {
//!         eprintln!("{op} {path} answered {status}");
//!     }
//!     Err(Error::PartialFailure { failures, .. }) => {
//!         eprintln!("{} member(s) could not be moved", failures.len());
//!     }
//!     Err(e) if e.is_transport() => eprintln!("server unreachable: {e}"),
//!     Err(e) => eprintln!("other error: {e}"),
//! }
//! # }
//! ```

pub mod auth;
mod body;
mod client;
mod config;
mod error;
pub mod multistatus;
pub mod path;
mod verbs;

pub use auth::{AuthScheme, Authenticator};
pub use body::{RequestBody, SeekableRead};
pub use client::{Client, ClientBuilder, HeaderHook, Interceptor};
pub use config::ClientConfig;
pub use error::{Error, ResourceFailure, Result};
pub use verbs::{ALLPROP, LISTING_PROPS};
