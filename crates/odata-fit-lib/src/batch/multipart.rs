//! `multipart/mixed` envelope parsing and writing.
//!
//! Only the framing is handled here: splitting a body on its boundary,
//! separating each part's MIME headers from its content, and writing
//! delimiters and header lines back out. What a part's content means is left
//! to [`super::request`] and [`super::framer`].

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use crate::error::{Error, Result};

/// Line terminator used for everything this module writes.
pub const CRLF: &str = "\r\n";

const CONTENT_ID: &str = "content-id";

/// One body part of a multipart envelope.
#[derive(Debug, Clone, Default)]
pub struct BatchPart {
    /// MIME headers of the part.
    pub headers: HeaderMap,
    /// Content following the header block.
    pub body: Bytes,
}

impl BatchPart {
    /// Value of the part's `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Value of the part's `Content-ID` header, without surrounding angle brackets.
    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get(CONTENT_ID)
            .and_then(|v| v.to_str().ok())
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|id| !id.is_empty())
    }

    /// Boundary of the nested envelope when this part is a changeset.
    pub fn changeset_boundary(&self) -> Option<String> {
        self.content_type()
            .filter(|value| is_multipart_mixed(value))
            .and_then(boundary_from_content_type)
    }

    /// Whether this part is itself a `multipart/mixed` changeset.
    pub fn is_changeset(&self) -> bool {
        self.changeset_boundary().is_some()
    }
}

/// Whether a `Content-Type` value denotes `multipart/mixed`.
pub fn is_multipart_mixed(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("multipart/mixed"))
        .unwrap_or(false)
}

/// Extract the `boundary` parameter of a `Content-Type` value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Split a multipart body into its parts.
///
/// The preamble before the first delimiter and the epilogue after the close
/// delimiter are ignored. A missing close delimiter is tolerated; the last part
/// then runs to the end of the body. Both CRLF and bare LF line endings are
/// accepted. The line break preceding a delimiter belongs to the delimiter.
pub fn split_parts(body: &[u8], boundary: &str) -> Result<Vec<BatchPart>> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut seen_delimiter = false;
    let mut closed = false;
    let mut offset = 0;

    for line in body.split_inclusive(|b| *b == b'\n') {
        let line_start = offset;
        offset += line.len();

        let Some(rest) = trim_line_end(line).strip_prefix(delimiter.as_bytes()) else {
            continue;
        };
        let rest = rest.trim_ascii_end();
        if !rest.is_empty() && rest != b"--" {
            continue;
        }

        seen_delimiter = true;
        if let Some(start) = current.take() {
            let end = content_end(body, start, line_start);
            parts.push(parse_part(&body[start..end]));
        }
        if rest == b"--" {
            closed = true;
            break;
        }
        current = Some(offset);
    }

    if !seen_delimiter {
        return Err(Error::MalformedBatch {
            message: format!("no delimiter for boundary {:?}", boundary),
        });
    }

    if !closed {
        if let Some(start) = current {
            if body[start..].iter().any(|b| !b.is_ascii_whitespace()) {
                parts.push(parse_part(&body[start..]));
            }
        }
    }

    Ok(parts)
}

fn content_end(body: &[u8], start: usize, delimiter_start: usize) -> usize {
    let mut end = delimiter_start;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn parse_part(content: &[u8]) -> BatchPart {
    let (lines, body) = split_head(content);
    BatchPart {
        headers: header_map(&lines),
        body: Bytes::copy_from_slice(body),
    }
}

/// Split an entity into its header lines and the body after the first blank line.
///
/// Folded header lines are joined onto the previous line. Without a blank
/// line the whole entity is treated as headers.
pub(crate) fn split_head(entity: &[u8]) -> (Vec<String>, &[u8]) {
    let mut lines: Vec<String> = Vec::new();
    let mut offset = 0;

    for line in entity.split_inclusive(|b| *b == b'\n') {
        offset += line.len();
        let text = String::from_utf8_lossy(trim_line_end(line));
        if text.trim().is_empty() {
            return (lines, &entity[offset..]);
        }
        if text.starts_with(&[' ', '\t'][..]) {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(text.trim());
                continue;
            }
        }
        lines.push(text.into_owned());
    }

    (lines, &entity[entity.len()..])
}

/// Parse `Name: value` lines into a header map; the last value per name wins.
pub(crate) fn header_map(lines: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line = %line, "ignoring header line without colon");
            continue;
        };
        match (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(line = %line, "ignoring invalid header line"),
        }
    }
    headers
}

/// Drop leading blank lines before an embedded HTTP message.
pub(crate) fn skip_blank_lines(mut bytes: &[u8]) -> &[u8] {
    while let Some(rest) = bytes
        .strip_prefix(b"\r\n")
        .or_else(|| bytes.strip_prefix(b"\n"))
    {
        bytes = rest;
    }
    bytes
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Builder for multipart output. Every line is CRLF-terminated.
#[derive(Debug, Default)]
pub struct MultipartWriter {
    buf: BytesMut,
}

impl MultipartWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `--boundary`.
    pub fn delimiter(&mut self, boundary: &str) {
        self.line(&format!("--{}", boundary));
    }

    /// Write the close delimiter `--boundary--`.
    pub fn close(&mut self, boundary: &str) {
        self.line(&format!("--{}--", boundary));
    }

    /// Write a `Name: value` header line.
    pub fn header(&mut self, name: &str, value: &str) {
        self.line(&format!("{}: {}", name, value));
    }

    /// Write a line of text.
    pub fn line(&mut self, text: &str) {
        self.buf.put_slice(text.as_bytes());
        self.buf.put_slice(CRLF.as_bytes());
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.buf.put_slice(CRLF.as_bytes());
    }

    /// Write raw bytes without a terminator.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "preamble\r\n\
--b1\r\n\
Content-Type: application/http\r\n\
Content-ID: <7>\r\n\
\r\n\
GET Products HTTP/1.1\r\n\
\r\n\
--b1\r\n\
Content-Type: multipart/mixed; boundary=\"cs_1\"\r\n\
\r\n\
--cs_1--\r\n\
--b1--\r\n\
epilogue";

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batch_1").as_deref(),
            Some("batch_1")
        );
        assert_eq!(
            boundary_from_content_type("multipart/mixed;charset=utf-8; BOUNDARY=\"q b\"").as_deref(),
            Some("q b")
        );
        assert_eq!(boundary_from_content_type("multipart/mixed"), None);
    }

    #[test]
    fn test_is_multipart_mixed() {
        assert!(is_multipart_mixed("Multipart/Mixed; boundary=x"));
        assert!(!is_multipart_mixed("application/http"));
    }

    #[test]
    fn test_split_parts() {
        let parts = split_parts(BODY.as_bytes(), "b1").unwrap();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].content_id().as_deref(), Some("7"));
        assert_eq!(&parts[0].body[..], b"GET Products HTTP/1.1\r\n");
        assert!(!parts[0].is_changeset());

        assert_eq!(parts[1].changeset_boundary().as_deref(), Some("cs_1"));
        assert_eq!(&parts[1].body[..], b"--cs_1--");
    }

    #[test]
    fn test_split_parts_bare_lf() {
        let body = BODY.replace("\r\n", "\n");
        let parts = split_parts(body.as_bytes(), "b1").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(&parts[0].body[..], b"GET Products HTTP/1.1\n");
    }

    #[test]
    fn test_split_parts_without_delimiter() {
        let err = split_parts(b"no parts here", "b1").unwrap_err();
        assert!(matches!(err, Error::MalformedBatch { .. }));
    }

    #[test]
    fn test_split_parts_unterminated() {
        let parts = split_parts(b"--b1\r\nA: 1\r\n\r\nbody", "b1").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0].body[..], b"body");
    }

    #[test]
    fn test_similar_boundary_is_content() {
        let parts = split_parts(b"--b1\r\n\r\n--b10\r\n--b1--\r\n", "b1").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0].body[..], b"--b10");
    }

    #[test]
    fn test_header_map_last_value_wins() {
        let lines = vec!["Accept: a".to_string(), "accept: b".to_string()];
        let headers = header_map(&lines);
        assert_eq!(headers.get_all("accept").iter().count(), 1);
        assert_eq!(headers["accept"], "b");
    }

    #[test]
    fn test_split_head_folding() {
        let (lines, body) = split_head(b"X-A: one\r\n  two\r\n\r\npayload");
        assert_eq!(lines, vec!["X-A: one two".to_string()]);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_writer() {
        let mut writer = MultipartWriter::new();
        writer.delimiter("b");
        writer.header("Content-Type", "application/http");
        writer.blank();
        writer.close("b");
        assert_eq!(
            &writer.into_bytes()[..],
            b"--b\r\nContent-Type: application/http\r\n\r\n--b--\r\n"
        );
    }
}
