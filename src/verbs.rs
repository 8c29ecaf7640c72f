//! WebDAV verbs built on [`Client::execute`].
//!
//! Each verb knows which status codes mean success for it and how to recover
//! from the two conditions WebDAV servers commonly report for perfectly
//! reasonable requests: `405` on MKCOL of an existing collection, and `409`
//! on COPY/MOVE into a collection that does not exist yet.
//!
//! Verb headers are appended after the client's default headers. A default
//! header with the same name is kept alongside, not replaced.

use crate::client::Client;
use crate::error::ResourceFailure;
use crate::multistatus::{self, MultistatusResponse};
use crate::{path, Error, RequestBody, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

const DEPTH: HeaderName = HeaderName::from_static("depth");
const DESTINATION: HeaderName = HeaderName::from_static("destination");
const OVERWRITE: HeaderName = HeaderName::from_static("overwrite");

const XML_CONTENT_TYPE: HeaderValue = HeaderValue::from_static("application/xml;charset=UTF-8");
const XML_ACCEPT: HeaderValue = HeaderValue::from_static("application/xml,text/xml");

/// A PROPFIND request body asking for all live properties.
pub const ALLPROP: &str = r#"<?xml version="1.0" encoding="utf-8"?><d:propfind xmlns:d="DAV:"><d:allprop/></d:propfind>"#;

/// A PROPFIND request body asking for the properties a directory listing needs.
pub const LISTING_PROPS: &str = r#"<?xml version="1.0" encoding="utf-8"?><d:propfind xmlns:d="DAV:"><d:prop><d:displayname/><d:resourcetype/><d:getcontentlength/><d:getcontenttype/><d:getetag/><d:getlastmodified/></d:prop></d:propfind>"#;

fn dav_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| Error::ConfigurationError(format!("Invalid method {}: {}", name, e)))
}

/// Reads the rest of a response body so the connection can be reused.
async fn drain(response: reqwest::Response) {
    if let Err(e) = response.bytes().await {
        tracing::debug!(error = %e, "Failed to drain response body");
    }
}

impl Client {
    /// Creates a collection.
    ///
    /// Servers answer `405 Method Not Allowed` when the collection already
    /// exists; that is reported as `201 Created` so creating is idempotent.
    /// Every other status is returned unchanged.
    pub async fn mkcol(&self, path: &str) -> Result<StatusCode> {
        let response = self.execute(dav_method("MKCOL")?, path, None, None).await?;
        let status = match response.status() {
            StatusCode::METHOD_NOT_ALLOWED => StatusCode::CREATED,
            status => status,
        };
        drain(response).await;
        Ok(status)
    }

    /// Sends `OPTIONS` with `Depth: 0`. The caller owns the response.
    pub async fn options(&self, path: &str) -> Result<reqwest::Response> {
        let hook = |headers: &mut HeaderMap| {
            headers.append(DEPTH, HeaderValue::from_static("0"));
        };
        self.execute(Method::OPTIONS, path, None, Some(&hook)).await
    }

    /// Checks that the root is reachable and accepts the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with operation `"Connect"` unless the root
    /// answers `OPTIONS` with `200 OK`.
    pub async fn connect(&self) -> Result<()> {
        let response = self.options("/").await?;
        let status = response.status();
        drain(response).await;
        if status != StatusCode::OK {
            return Err(Error::protocol("Connect", self.root().as_str(), status));
        }
        Ok(())
    }

    /// Runs a PROPFIND and hands every `<D:response>` to `on_response`.
    ///
    /// `self_only` selects `Depth: 0` (the resource itself) over `Depth: 1`
    /// (the resource and its direct members). `body` is the `propfind` XML
    /// request document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with operation `"PROPFIND"` for any status
    /// other than `207 Multi-Status`, and [`Error::Xml`] (or whatever
    /// `on_response` returns) if the multistatus body cannot be consumed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example(client: davcall::Client) -> Result<(), davcall::Error> {
    /// let mut names = Vec::new();
    /// client
    ///     .propfind("docs/", false, davcall::ALLPROP, |response| {
    ///         names.push(response.href);
    ///         Ok(())
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn propfind<F>(
        &self,
        path: &str,
        self_only: bool,
        body: &str,
        on_response: F,
    ) -> Result<()>
    where
        F: FnMut(MultistatusResponse) -> Result<()>,
    {
        let depth = if self_only { "0" } else { "1" };
        let hook = move |headers: &mut HeaderMap| {
            headers.append(DEPTH, HeaderValue::from_static(depth));
            headers.append(http::header::CONTENT_TYPE, XML_CONTENT_TYPE);
            headers.append(http::header::ACCEPT, XML_ACCEPT);
            headers.append(http::header::ACCEPT_CHARSET, HeaderValue::from_static("utf-8"));
            // Compression is not negotiated.
            headers.append(http::header::ACCEPT_ENCODING, HeaderValue::from_static(""));
        };

        let response = self
            .execute(
                dav_method("PROPFIND")?,
                path,
                Some(RequestBody::from(body.to_string())),
                Some(&hook),
            )
            .await?;

        let status = response.status();
        if status != StatusCode::MULTI_STATUS {
            drain(response).await;
            return Err(Error::protocol("PROPFIND", path, status));
        }

        let bytes = response.bytes().await.map_err(Error::from_transport)?;
        multistatus::parse(&bytes, on_response)
    }

    /// Sends a COPY or MOVE without interpreting the answer.
    ///
    /// The `Destination` header carries the escaped absolute URL of
    /// `new_path`, `Overwrite` is `T` or `F`. The caller owns the response.
    pub async fn do_copy_move(
        &self,
        method: Method,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(StatusCode, reqwest::Response)> {
        let destination = path::join(self.root(), new_path)?;
        let destination = HeaderValue::try_from(destination.as_str())
            .map_err(|e| Error::ConfigurationError(format!("Invalid destination: {}", e)))?;
        let hook = move |headers: &mut HeaderMap| {
            headers.append(DESTINATION, destination.clone());
            headers.append(
                OVERWRITE,
                HeaderValue::from_static(if overwrite { "T" } else { "F" }),
            );
        };

        let response = self.execute(method, old_path, None, Some(&hook)).await?;
        Ok((response.status(), response))
    }

    /// Copies or moves `old_path` to `new_path`.
    ///
    /// - `201` and `204` are success.
    /// - `409 Conflict` means the destination's parent is missing: every
    ///   missing ancestor of `new_path` is created and the request is sent
    ///   once more. A second `409` is reported like any other failure.
    /// - `207 Multi-Status` is reported as [`Error::PartialFailure`] listing
    ///   the member resources that failed.
    /// - Anything else is [`Error::Protocol`] named after the method.
    pub async fn copy_move(
        &self,
        method: Method,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<()> {
        let mut parents_created = false;

        loop {
            let (status, response) = self
                .do_copy_move(method.clone(), old_path, new_path, overwrite)
                .await?;

            match status {
                StatusCode::CREATED | StatusCode::NO_CONTENT => {
                    drain(response).await;
                    return Ok(());
                }
                StatusCode::MULTI_STATUS => {
                    let body = response.bytes().await.map_err(Error::from_transport)?;
                    return Err(partial_failure(&method, old_path, &body));
                }
                StatusCode::CONFLICT if !parents_created => {
                    drain(response).await;
                    tracing::debug!(
                        method = %method,
                        path = %old_path,
                        destination = %new_path,
                        "Destination parent missing, creating collections"
                    );
                    self.create_parent_collection(new_path).await?;
                    parents_created = true;
                }
                status => {
                    drain(response).await;
                    return Err(Error::protocol(method.as_str(), old_path, status));
                }
            }
        }
    }

    /// Copies `old_path` to `new_path`. See [`Client::copy_move`].
    pub async fn copy(&self, old_path: &str, new_path: &str, overwrite: bool) -> Result<()> {
        self.copy_move(dav_method("COPY")?, old_path, new_path, overwrite)
            .await
    }

    /// Moves `old_path` to `new_path`. See [`Client::copy_move`].
    pub async fn rename(&self, old_path: &str, new_path: &str, overwrite: bool) -> Result<()> {
        self.copy_move(dav_method("MOVE")?, old_path, new_path, overwrite)
            .await
    }

    /// Uploads `body` to `path` and returns the raw status.
    ///
    /// If the server challenges, the body is replayed according to its kind
    /// (see [`RequestBody`]).
    pub async fn put(&self, path: &str, body: impl Into<RequestBody>) -> Result<StatusCode> {
        let response = self
            .execute(Method::PUT, path, Some(body.into()), None)
            .await?;
        let status = response.status();
        drain(response).await;
        Ok(status)
    }

    /// Makes sure every collection above `item_path` exists.
    ///
    /// Items directly under the root have nothing to create.
    pub async fn create_parent_collection(&self, item_path: &str) -> Result<()> {
        match path::parent_collection(item_path) {
            Some(parent) => self.mkdir_all(parent).await,
            None => Ok(()),
        }
    }

    /// Creates `path` and all of its missing ancestors, outermost first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with operation `"MkdirAll"` naming the
    /// first collection that could not be created.
    pub async fn mkdir_all(&self, path: &str) -> Result<()> {
        for sub in path::ancestors(path) {
            let status = self.mkcol(&sub).await?;
            tracing::debug!(path = %sub, status = status.as_u16(), "MKCOL");
            if status != StatusCode::CREATED {
                return Err(Error::protocol("MkdirAll", sub, status));
            }
        }
        Ok(())
    }
}

fn partial_failure(method: &Method, path: &str, body: &[u8]) -> Error {
    let failures: Vec<ResourceFailure> = match multistatus::parse_all(body) {
        Ok(responses) => responses.iter().filter_map(|r| r.failure()).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable multistatus body");
            Vec::new()
        }
    };

    tracing::warn!(
        method = %method,
        path = %path,
        failures = failures.len(),
        body = %String::from_utf8_lossy(body),
        "Multi-Status result"
    );

    Error::PartialFailure {
        op: method.to_string(),
        path: path.to_string(),
        failures,
    }
}
