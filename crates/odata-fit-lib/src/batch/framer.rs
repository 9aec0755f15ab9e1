//! Framing of inner responses into a multipart batch response, and the
//! inverse parse used by clients and tests.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, CONNECTION, TRANSFER_ENCODING};
use http::StatusCode;
use uuid::Uuid;

use super::dispatch::InnerResponse;
use super::multipart::{
    header_map, skip_blank_lines, split_head, split_parts, BatchPart, MultipartWriter, CRLF,
};
use crate::error::{Error, Result};

const APPLICATION_HTTP: &str = "application/http";
const CONTENT_ID: &str = "Content-ID";

/// Generate a fresh `changeset_<uuid>` boundary.
pub fn new_changeset_boundary() -> String {
    format!("changeset_{}", Uuid::new_v4())
}

/// Serialize a response as an HTTP/1.1 message: status line, headers, blank
/// line, body. Multi-valued headers are joined with `", "`.
pub fn serialize_http_response(response: &InnerResponse) -> Bytes {
    serialize_message(response, None)
}

fn serialize_message(response: &InnerResponse, content_id: Option<&str>) -> Bytes {
    let mut buf = BytesMut::with_capacity(response.body.len() + 256);
    let status_line = format!(
        "HTTP/1.1 {} {}",
        response.status.as_u16(),
        response.reason
    );
    put_line(&mut buf, &status_line);

    for name in response.headers.keys() {
        if skip_header(name) {
            continue;
        }
        let joined = response
            .headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        put_line(&mut buf, &format!("{}: {}", name, joined));
    }
    if let Some(id) = content_id {
        put_line(&mut buf, &format!("{}: {}", CONTENT_ID, id));
    }

    buf.put_slice(CRLF.as_bytes());
    buf.put_slice(&response.body);
    buf.freeze()
}

fn skip_header(name: &HeaderName) -> bool {
    *name == TRANSFER_ENCODING || *name == CONNECTION || name.as_str() == "content-id"
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF.as_bytes());
}

/// Write one `application/http` block for `response` under `boundary`.
pub fn write_single(
    out: &mut MultipartWriter,
    boundary: &str,
    content_id: Option<&str>,
    response: &InnerResponse,
) {
    out.delimiter(boundary);
    out.header("Content-Type", APPLICATION_HTTP);
    out.header("Content-Transfer-Encoding", "binary");
    if let Some(id) = content_id {
        out.header(CONTENT_ID, id);
    }
    out.blank();
    out.raw(&serialize_message(response, content_id));
    out.blank();
    out.blank();
}

/// Open a changeset part nested under `outer_boundary`.
pub fn begin_changeset(out: &mut MultipartWriter, outer_boundary: &str, changeset_boundary: &str) {
    out.delimiter(outer_boundary);
    out.header(
        "Content-Type",
        &format!("multipart/mixed;boundary={}", changeset_boundary),
    );
    out.blank();
}

/// Close a changeset opened with [`begin_changeset`].
pub fn end_changeset(out: &mut MultipartWriter, changeset_boundary: &str) {
    out.close(changeset_boundary);
}

/// A response recovered from a framed block.
#[derive(Debug, Clone)]
pub struct FramedResponse {
    /// Content-ID of the block, if any.
    pub content_id: Option<String>,
    /// The embedded response.
    pub response: InnerResponse,
}

/// One top-level item of a parsed batch response.
#[derive(Debug, Clone)]
pub enum BatchItemResponse {
    Single(FramedResponse),
    Changeset(Vec<FramedResponse>),
}

impl BatchItemResponse {
    /// Statuses of the item, one per framed block.
    pub fn statuses(&self) -> Vec<u16> {
        match self {
            BatchItemResponse::Single(framed) => vec![framed.response.status.as_u16()],
            BatchItemResponse::Changeset(members) => members
                .iter()
                .map(|framed| framed.response.status.as_u16())
                .collect(),
        }
    }
}

/// Parse one framed `application/http` block.
pub fn parse_response_part(part: &BatchPart) -> Result<FramedResponse> {
    let (lines, body) = split_head(skip_blank_lines(&part.body));
    let Some((status_line, header_lines)) = lines.split_first() else {
        return Err(Error::MalformedBatch {
            message: "response block without status line".to_string(),
        });
    };

    let mut tokens = status_line.splitn(3, ' ');
    let (Some(protocol), Some(code)) = (tokens.next(), tokens.next()) else {
        return Err(malformed_status(status_line));
    };
    if !protocol.starts_with("HTTP/") {
        return Err(malformed_status(status_line));
    }
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| malformed_status(status_line))?;
    let reason = tokens.next().unwrap_or_default().trim().to_string();

    let headers = header_map(header_lines);
    let content_id = part.content_id().or_else(|| {
        headers
            .get("content-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    let body = body
        .strip_suffix(CRLF.as_bytes())
        .or_else(|| body.strip_suffix(b"\n"))
        .unwrap_or(body);

    Ok(FramedResponse {
        content_id,
        response: InnerResponse {
            status,
            reason,
            headers,
            body: Bytes::copy_from_slice(body),
        },
    })
}

fn malformed_status(line: &str) -> Error {
    Error::MalformedBatch {
        message: format!("invalid status line {:?}", line),
    }
}

/// Parse a complete batch response body framed under `boundary`.
pub fn parse_batch_response(body: &[u8], boundary: &str) -> Result<Vec<BatchItemResponse>> {
    split_parts(body, boundary)?
        .iter()
        .map(|part| match part.changeset_boundary() {
            Some(changeset) => split_parts(&part.body, &changeset)?
                .iter()
                .map(parse_response_part)
                .collect::<Result<Vec<_>>>()
                .map(BatchItemResponse::Changeset),
            None => parse_response_part(part).map(BatchItemResponse::Single),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, LOCATION, SET_COOKIE};

    fn created() -> InnerResponse {
        InnerResponse::new(StatusCode::CREATED)
            .with_header(LOCATION, HeaderValue::from_static("http://h/V40/Products(1)"))
            .with_header(SET_COOKIE, HeaderValue::from_static("a=1"))
            .with_header(SET_COOKIE, HeaderValue::from_static("b=2"))
            .with_header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
            .with_body("application/json", "{\"Id\":1}")
    }

    #[test]
    fn test_write_single_layout() {
        let mut out = MultipartWriter::new();
        write_single(&mut out, "b", Some("1"), &InnerResponse::new(StatusCode::NO_CONTENT));
        out.close("b");

        let text = String::from_utf8(out.into_bytes().to_vec()).unwrap();
        assert_eq!(
            text,
            "--b\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
Content-ID: 1\r\n\
\r\n\
HTTP/1.1 204 No Content\r\n\
Content-ID: 1\r\n\
\r\n\
\r\n\
\r\n\
--b--\r\n"
        );
    }

    #[test]
    fn test_frame_then_parse_block() {
        let mut out = MultipartWriter::new();
        write_single(&mut out, "b", Some("4"), &created());
        out.close("b");

        let items = parse_batch_response(&out.into_bytes(), "b").unwrap();
        let [BatchItemResponse::Single(framed)] = items.as_slice() else {
            panic!("expected one single response, got {:?}", items);
        };

        assert_eq!(framed.content_id.as_deref(), Some("4"));
        assert_eq!(framed.response.status, StatusCode::CREATED);
        assert_eq!(framed.response.reason, "Created");
        assert_eq!(framed.response.location(), Some("http://h/V40/Products(1)"));
        assert_eq!(framed.response.headers["set-cookie"], "a=1, b=2");
        assert!(framed.response.headers.get("transfer-encoding").is_none());
        assert_eq!(&framed.response.body[..], b"{\"Id\":1}");
    }

    #[test]
    fn test_parse_changeset() {
        let mut out = MultipartWriter::new();
        let changeset = new_changeset_boundary();
        begin_changeset(&mut out, "b", &changeset);
        write_single(&mut out, &changeset, Some("1"), &created());
        write_single(&mut out, &changeset, Some("2"), &InnerResponse::new(StatusCode::NO_CONTENT));
        end_changeset(&mut out, &changeset);
        out.close("b");

        let items = parse_batch_response(&out.into_bytes(), "b").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].statuses(), vec![201, 204]);
        assert!(changeset.starts_with("changeset_"));
    }

    #[test]
    fn test_serialize_http_response() {
        let bytes = serialize_http_response(&InnerResponse::new(StatusCode::NOT_FOUND).with_body("text/plain", "gone"));
        assert_eq!(
            &bytes[..],
            b"HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\n\r\ngone"
        );
    }

    #[test]
    fn test_parse_invalid_status() {
        let part = BatchPart {
            body: Bytes::from_static(b"HTTP/1.1 abc Nope\r\n\r\n"),
            ..BatchPart::default()
        };
        assert!(matches!(parse_response_part(&part), Err(Error::MalformedBatch { .. })));
    }
}
