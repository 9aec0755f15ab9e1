//! Embedded HTTP requests of batch parts.

use http::header::{HeaderMap, CONTENT_LENGTH, HOST};
use http::Method;
use url::Url;

use super::multipart::{header_map, skip_blank_lines, split_head, BatchPart};
use super::references::ReferenceTable;
use crate::error::{Error, Result};

/// Header carrying the tunneled verb when `PATCH`/`MERGE` are sent as `POST`.
pub const X_HTTP_METHOD: &str = "X-HTTP-Method";

/// The request line of an embedded HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    /// `METHOD http://host/path HTTP/1.1`
    Absolute { method: Method, url: Url },
    /// `METHOD $N/suffix HTTP/1.1`, relative to an earlier changeset member.
    Referenced {
        method: Method,
        content_id: String,
        suffix: String,
    },
    /// `METHOD Products(1) HTTP/1.1`, relative to the service root.
    Relative { method: Method, path: String },
    /// Anything else.
    Unparseable { line: String },
}

impl RequestLine {
    /// Parse a request line. Never fails; unrecognized input yields
    /// [`RequestLine::Unparseable`].
    pub fn parse(line: &str) -> Self {
        let unparseable = || RequestLine::Unparseable {
            line: line.to_string(),
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [method, target, protocol] = tokens.as_slice() else {
            return unparseable();
        };
        if !protocol.starts_with("HTTP/") {
            return unparseable();
        }
        let Some(method) = parse_method(method) else {
            return unparseable();
        };

        if target.starts_with("http://") || target.starts_with("https://") {
            return match Url::parse(target) {
                Ok(url) => RequestLine::Absolute { method, url },
                Err(_) => unparseable(),
            };
        }

        if let Some(reference) = target.strip_prefix('$') {
            let digits = reference
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(reference.len());
            if digits > 0 {
                return RequestLine::Referenced {
                    method,
                    content_id: reference[..digits].to_string(),
                    suffix: reference[digits..].to_string(),
                };
            }
        }

        RequestLine::Relative {
            method,
            path: target.to_string(),
        }
    }

    /// Method of a parsed line.
    pub fn method(&self) -> Option<&Method> {
        match self {
            RequestLine::Absolute { method, .. }
            | RequestLine::Referenced { method, .. }
            | RequestLine::Relative { method, .. } => Some(method),
            RequestLine::Unparseable { .. } => None,
        }
    }

    /// Resolve the request target to an absolute URL.
    pub fn resolve(&self, service_root: &Url, references: &ReferenceTable) -> Result<Url> {
        match self {
            RequestLine::Absolute { url, .. } => Ok(url.clone()),
            // `/V40/Products` is host-absolute; `Products` is below the service root.
            RequestLine::Relative { path, .. } => {
                service_root.join(path).map_err(|err| Error::InvalidUrl {
                    url: path.clone(),
                    message: err.to_string(),
                })
            }
            RequestLine::Referenced {
                content_id, suffix, ..
            } => {
                let reference = format!("${}", content_id);
                let location =
                    references
                        .get(&reference)
                        .ok_or_else(|| Error::UnresolvedReference {
                            reference: reference.clone(),
                        })?;
                let target = format!("{}{}", location, suffix);
                Url::parse(&target).map_err(|err| Error::InvalidUrl {
                    url: target,
                    message: err.to_string(),
                })
            }
            RequestLine::Unparseable { line } => {
                Err(Error::UnparseableRequest { line: line.clone() })
            }
        }
    }
}

fn parse_method(token: &str) -> Option<Method> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    Method::from_bytes(token.as_bytes()).ok()
}

/// A fully resolved request ready for dispatch.
#[derive(Debug, Clone)]
pub struct InnerRequest {
    /// Verb as written in the batch.
    pub method: Method,
    /// Absolute target with references substituted.
    pub url: Url,
    /// Embedded request headers, last value per name.
    pub headers: HeaderMap,
    /// Body with `$N` references substituted.
    ///
    /// Decoded as UTF-8; invalid sequences are replaced, so binary media
    /// payloads do not survive a batch intact.
    pub body: String,
}

impl InnerRequest {
    /// Build the request carried by a leaf batch part.
    ///
    /// Fails with [`Error::UnparseableRequest`] when no request line is
    /// recognized, and with [`Error::UnresolvedReference`] when the target
    /// names a Content-ID unknown to `references`.
    pub fn from_part(
        part: &BatchPart,
        service_root: &Url,
        references: &ReferenceTable,
    ) -> Result<Self> {
        let (lines, body) = split_head(skip_blank_lines(&part.body));
        let Some((request_line, header_lines)) = lines.split_first() else {
            return Err(Error::UnparseableRequest {
                line: String::new(),
            });
        };

        let line = RequestLine::parse(request_line);
        let url = line.resolve(service_root, references)?;
        let method = line.method().cloned().ok_or_else(|| Error::UnparseableRequest {
            line: request_line.clone(),
        })?;

        let mut headers = header_map(header_lines);
        headers.remove(CONTENT_LENGTH);
        headers.remove(HOST);

        Ok(Self {
            method,
            url,
            headers,
            body: references.substitute(&String::from_utf8_lossy(body)),
        })
    }

    /// Method to put on the wire plus the tunneled verb, if any.
    ///
    /// `PATCH` and `MERGE` travel as `POST` with [`X_HTTP_METHOD`].
    pub fn wire_method(&self) -> (Method, Option<&str>) {
        match self.method.as_str() {
            "PATCH" | "MERGE" => (Method::POST, Some(self.method.as_str())),
            _ => (self.method.clone(), None),
        }
    }

    /// Whether a body is sent. `DELETE` never carries one.
    pub fn sends_body(&self) -> bool {
        self.method != Method::DELETE && !self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn root() -> Url {
        Url::parse("http://localhost:8080/V40/").unwrap()
    }

    fn part(content: &str) -> BatchPart {
        BatchPart {
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(content.as_bytes()),
        }
    }

    #[test]
    fn test_parse_absolute() {
        let line = RequestLine::parse("GET http://localhost/V40/Products(-10) HTTP/1.1");
        match line {
            RequestLine::Absolute { method, url } => {
                assert_eq!(method, Method::GET);
                assert_eq!(url.path(), "/V40/Products(-10)");
            }
            other => panic!("unexpected line: {:?}", other),
        }
    }

    #[test]
    fn test_parse_referenced() {
        let line = RequestLine::parse("PATCH $12/Name HTTP/1.1");
        assert_eq!(
            line,
            RequestLine::Referenced {
                method: Method::PATCH,
                content_id: "12".to_string(),
                suffix: "/Name".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_relative_and_extension_method() {
        let line = RequestLine::parse("MERGE Products(1) HTTP/1.1");
        assert_eq!(line.method().map(Method::as_str), Some("MERGE"));
        assert!(matches!(line, RequestLine::Relative { .. }));
    }

    #[test]
    fn test_parse_unparseable() {
        for text in ["", "GET", "GET /x", "get /x HTTP/1.1", "GET /x FTP/1", "GET a b HTTP/1.1"] {
            assert!(
                matches!(RequestLine::parse(text), RequestLine::Unparseable { .. }),
                "{:?} should be unparseable",
                text
            );
        }
    }

    #[test]
    fn test_from_part_substitutes_references() {
        let mut references = ReferenceTable::new();
        references.put("1", "http://localhost:8080/V40/Products(-10)");

        let request = InnerRequest::from_part(
            &part("PATCH $1 HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 3\r\n\r\n{\"Link\":\"$1\"}"),
            &root(),
            &references,
        )
        .unwrap();

        assert_eq!(request.url.as_str(), "http://localhost:8080/V40/Products(-10)");
        assert_eq!(request.headers["content-type"], "application/json");
        assert!(request.headers.get("content-length").is_none());
        assert_eq!(request.body, "{\"Link\":\"http://localhost:8080/V40/Products(-10)\"}");
        assert_eq!(request.wire_method(), (Method::POST, Some("PATCH")));
    }

    #[test]
    fn test_from_part_relative() {
        let request = InnerRequest::from_part(
            &part("\r\nDELETE Products(3) HTTP/1.1\r\n\r\nignored"),
            &root(),
            &ReferenceTable::new(),
        )
        .unwrap();
        assert_eq!(request.url.as_str(), "http://localhost:8080/V40/Products(3)");
        assert!(!request.sends_body());
        assert_eq!(request.wire_method(), (Method::DELETE, None));
    }

    #[test]
    fn test_resolve_absolute_path() {
        let line = RequestLine::parse("GET /V40/Products(-10) HTTP/1.1");
        let url = line.resolve(&root(), &ReferenceTable::new()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/V40/Products(-10)");

        let request = InnerRequest::from_part(
            &part("GET /V30/Customers('ALFKI') HTTP/1.1\r\n\r\n"),
            &root(),
            &ReferenceTable::new(),
        )
        .unwrap();
        assert_eq!(request.url.as_str(), "http://localhost:8080/V30/Customers('ALFKI')");
    }

    #[test]
    fn test_from_part_unresolved() {
        let err = InnerRequest::from_part(&part("GET $4 HTTP/1.1\r\n\r\n"), &root(), &ReferenceTable::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { ref reference } if reference == "$4"));
    }

    #[test]
    fn test_from_part_empty() {
        let err = InnerRequest::from_part(&part(""), &root(), &ReferenceTable::new()).unwrap_err();
        assert!(matches!(err, Error::UnparseableRequest { .. }));
    }
}
