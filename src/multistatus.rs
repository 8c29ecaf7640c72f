//! Parsing of `207 Multi-Status` response bodies.
//!
//! The parser walks the document once and hands every completed
//! `<D:response>` to a callback, so large PROPFIND listings never have to be
//! held as a whole. Element names are matched on their local part; namespace
//! prefixes are ignored.

use crate::error::ResourceFailure;
use crate::{Error, Result};
use http::StatusCode;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One `<D:response>` element of a multistatus document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultistatusResponse {
    /// The resource this response describes, as sent by the server.
    pub href: String,
    /// The response-level status (COPY/MOVE/DELETE style responses).
    pub status: Option<StatusCode>,
    /// The property groups (PROPFIND style responses).
    pub propstats: Vec<Propstat>,
    /// Optional human readable explanation.
    pub description: Option<String>,
}

/// A `<D:propstat>` group: properties sharing one status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propstat {
    /// Status of the group; `200 OK` when the server omitted it.
    pub status: StatusCode,
    /// Properties in document order.
    pub props: Vec<Property>,
}

/// A single property inside `<D:prop>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    /// Local name, e.g. `getcontentlength`.
    pub name: String,
    /// Trimmed text content.
    pub value: String,
    /// Local names of nested elements, e.g. `collection` inside `resourcetype`.
    pub children: Vec<String>,
}

impl MultistatusResponse {
    /// Looks up a property reported with a successful status.
    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.propstats
            .iter()
            .filter(|ps| ps.status.is_success())
            .flat_map(|ps| ps.props.iter())
            .find(|p| p.name == name)
    }

    /// Returns `true` if `resourcetype` lists `collection`.
    pub fn is_collection(&self) -> bool {
        self.prop("resourcetype")
            .map(|p| p.children.iter().any(|c| c == "collection"))
            .unwrap_or(false)
    }

    /// The response-level status as a failure, if it is not a success.
    pub fn failure(&self) -> Option<ResourceFailure> {
        match self.status {
            Some(status) if !status.is_success() => Some(ResourceFailure {
                href: self.href.clone(),
                status,
            }),
            _ => None,
        }
    }
}

/// Parses a multistatus document, invoking `on_response` for each response.
///
/// # Errors
///
/// Returns [`Error::Xml`] if the document is malformed or is not a
/// multistatus, and propagates the first error returned by `on_response`.
///
/// # Examples
///
/// ```
/// let body = br#"<?xml version="1.0"?>
/// <d:multistatus xmlns:d="DAV:">
///   <d:response>
///     <d:href>/dav/file.txt</d:href>
///     <d:propstat>
///       <d:prop><d:getcontentlength>42</d:getcontentlength></d:prop>
///       <d:status>HTTP/1.1 200 OK</d:status>
///     </d:propstat>
///   </d:response>
/// </d:multistatus>"#;
///
/// let mut sizes = Vec::new();
/// davcall::multistatus::parse(body, |response| {
///     let size = response.prop("getcontentlength").map(|p| p.value.clone());
///     sizes.push((response.href, size));
///     Ok(())
/// })
/// .unwrap();
///
/// assert_eq!(sizes, vec![("/dav/file.txt".to_string(), Some("42".to_string()))]);
/// ```
pub fn parse<F>(body: &[u8], mut on_response: F) -> Result<()>
where
    F: FnMut(MultistatusResponse) -> Result<()>,
{
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut saw_root = false;

    let mut response: Option<MultistatusResponse> = None;
    let mut propstat: Option<(Option<StatusCode>, Vec<Property>)> = None;
    let mut property: Option<Property> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Xml(e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                let name = local_name(e.local_name().as_ref())?;
                let parent = stack.last().map(String::as_str);
                open_element(
                    &name,
                    parent,
                    &mut saw_root,
                    &mut response,
                    &mut propstat,
                    &mut property,
                );
                stack.push(name);
                text.clear();
            }
            Event::Empty(ref e) => {
                let name = local_name(e.local_name().as_ref())?;
                let parent = stack.last().map(String::as_str);
                open_element(
                    &name,
                    parent,
                    &mut saw_root,
                    &mut response,
                    &mut propstat,
                    &mut property,
                );
                if let Some(prop) = close_property(&name, parent, &mut property, &text) {
                    if let Some((_, props)) = propstat.as_mut() {
                        props.push(prop);
                    }
                }
            }
            Event::Text(ref e) => {
                let unescaped = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(ref e) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    return Err(Error::Xml("unbalanced end tag".to_string()));
                };
                let parent = stack.last().map(String::as_str);

                match (name.as_str(), parent) {
                    ("href", Some("response")) => {
                        if let Some(r) = response.as_mut() {
                            r.href = text.trim().to_string();
                        }
                    }
                    ("status", Some("response")) => {
                        if let Some(r) = response.as_mut() {
                            r.status = parse_status_line(&text);
                        }
                    }
                    ("responsedescription", Some("response")) => {
                        if let Some(r) = response.as_mut() {
                            r.description = Some(text.trim().to_string());
                        }
                    }
                    ("status", Some("propstat")) => {
                        if let Some((status, _)) = propstat.as_mut() {
                            *status = parse_status_line(&text);
                        }
                    }
                    ("propstat", Some("response")) => {
                        if let (Some(r), Some((status, props))) = (response.as_mut(), propstat.take())
                        {
                            r.propstats.push(Propstat {
                                status: status.unwrap_or(StatusCode::OK),
                                props,
                            });
                        }
                    }
                    ("response", Some("multistatus")) => {
                        if let Some(r) = response.take() {
                            on_response(r)?;
                        }
                    }
                    _ => {
                        if let Some(prop) = close_property(&name, parent, &mut property, &text) {
                            if let Some((_, props)) = propstat.as_mut() {
                                props.push(prop);
                            }
                        }
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(Error::Xml("missing multistatus root element".to_string()));
    }
    Ok(())
}

/// Parses a multistatus document into a list of responses.
pub fn parse_all(body: &[u8]) -> Result<Vec<MultistatusResponse>> {
    let mut responses = Vec::new();
    parse(body, |r| {
        responses.push(r);
        Ok(())
    })?;
    Ok(responses)
}

fn open_element(
    name: &str,
    parent: Option<&str>,
    saw_root: &mut bool,
    response: &mut Option<MultistatusResponse>,
    propstat: &mut Option<(Option<StatusCode>, Vec<Property>)>,
    property: &mut Option<Property>,
) {
    match (name, parent) {
        ("multistatus", None) => *saw_root = true,
        ("response", Some("multistatus")) => *response = Some(MultistatusResponse::default()),
        ("propstat", Some("response")) => *propstat = Some((None, Vec::new())),
        (_, Some("prop")) if propstat.is_some() => {
            *property = Some(Property {
                name: name.to_string(),
                ..Property::default()
            });
        }
        _ => {
            if let Some(prop) = property.as_mut() {
                prop.children.push(name.to_string());
            }
        }
    }
}

/// Finishes the open property when its own element closes.
fn close_property(
    name: &str,
    parent: Option<&str>,
    property: &mut Option<Property>,
    text: &str,
) -> Option<Property> {
    if parent != Some("prop") || property.as_ref().map(|p| p.name.as_str()) != Some(name) {
        return None;
    }
    property.take().map(|mut prop| {
        prop.value = text.trim().to_string();
        prop
    })
}

fn local_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| Error::Xml(e.to_string()))
}

/// Extracts the code from a status line such as `HTTP/1.1 404 Not Found`.
fn parse_status_line(line: &str) -> Option<StatusCode> {
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/docs/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>docs</D:displayname>
        <D:resourcetype><D:collection/></D:resourcetype>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/docs/a%20%26%20b.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>a &amp; b.txt</D:displayname>
        <D:getcontentlength>1024</D:getcontentlength>
        <D:resourcetype/>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:quota-used-bytes/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn test_parse_listing() {
        let responses = parse_all(LISTING.as_bytes()).unwrap();
        assert_eq!(responses.len(), 2);

        let dir = &responses[0];
        assert_eq!(dir.href, "/dav/docs/");
        assert!(dir.is_collection());
        assert_eq!(dir.prop("displayname").unwrap().value, "docs");

        let file = &responses[1];
        assert!(!file.is_collection());
        assert_eq!(file.prop("displayname").unwrap().value, "a & b.txt");
        assert_eq!(file.prop("getcontentlength").unwrap().value, "1024");
        assert_eq!(file.propstats.len(), 2);
        assert_eq!(file.propstats[1].status, StatusCode::NOT_FOUND);
        assert!(file.prop("quota-used-bytes").is_none());
    }

    #[test]
    fn test_response_level_status() {
        let body = r#"<d:multistatus xmlns:d="DAV:">
            <d:response>
                <d:href>/dav/dir/locked.txt</d:href>
                <d:status>HTTP/1.1 423 Locked</d:status>
            </d:response>
            <d:response>
                <d:href>/dav/dir/ok.txt</d:href>
                <d:status>HTTP/1.1 201 Created</d:status>
            </d:response>
        </d:multistatus>"#;

        let responses = parse_all(body.as_bytes()).unwrap();
        let failures: Vec<_> = responses.iter().filter_map(|r| r.failure()).collect();
        assert_eq!(
            failures,
            vec![ResourceFailure {
                href: "/dav/dir/locked.txt".to_string(),
                status: StatusCode::LOCKED,
            }]
        );
    }

    #[test]
    fn test_callback_error_stops_parsing() {
        let mut seen = 0;
        let result = parse(LISTING.as_bytes(), |_| {
            seen += 1;
            Err(Error::Xml("stop".to_string()))
        });
        assert!(matches!(result, Err(Error::Xml(msg)) if msg == "stop"));
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_rejects_non_multistatus() {
        assert!(matches!(
            parse_all(b"<html><body>oops</body></html>"),
            Err(Error::Xml(_))
        ));
        assert!(matches!(parse_all(b""), Err(Error::Xml(_))));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            parse_status_line("HTTP/1.1 507 Insufficient Storage"),
            Some(StatusCode::INSUFFICIENT_STORAGE)
        );
        assert_eq!(parse_status_line("garbage"), None);
    }
}
