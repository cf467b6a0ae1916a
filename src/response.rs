//! The response sink handed to handlers.
//!
//! A [`ResponseWriter`] is a cheap, cloneable handle onto one buffered
//! response. Handlers write to it; once the handler chain returns, the
//! server takes the buffered status, headers, and body and hands them to
//! hyper. Because every clone points at the same buffer, middleware can keep
//! a clone across the call to `next` and inspect or complete the response
//! afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseWriter::bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Buffered {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    sent: bool,
}

/// Handle onto the outgoing response of one request.
///
/// The first status written commits the response. Writing body bytes
/// without a status commits `200 OK`. Headers may be changed until the
/// response is sent, since nothing reaches the wire before the handler
/// chain returns.
///
/// ```rust
/// use http::StatusCode;
/// use tern::ResponseWriter;
///
/// let w = ResponseWriter::new();
/// w.insert_header("location", "/users/42").unwrap();
/// w.write_header(StatusCode::CREATED);
/// w.write(br#"{"id":42}"#).unwrap();
/// assert!(w.is_committed());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Buffered>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Buffered> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commits the response status. Later calls are ignored.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state();
        if state.status.is_none() {
            state.status = Some(status);
        }
    }

    /// Appends `buf` to the body, committing `200 OK` if no status was set.
    ///
    /// Fails with [`Error::ResponseClosed`] once the response has been sent.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        let mut state = self.state();
        if state.sent {
            return Err(Error::ResponseClosed);
        }
        state.status.get_or_insert(StatusCode::OK);
        state.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn insert_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let invalid = || Error::InvalidHeader { name: name.to_owned() };
        let name_h = HeaderName::try_from(name).map_err(|_| invalid())?;
        let value_h = HeaderValue::try_from(value).map_err(|_| invalid())?;

        let mut state = self.state();
        if state.sent {
            return Err(Error::ResponseClosed);
        }
        state.headers.insert(name_h, value_h);
        Ok(())
    }

    /// Writes a complete `text/plain` response.
    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> Result<(), Error> {
        let body: String = body.into();
        self.bytes(status, ContentType::Text, body.as_bytes())
    }

    /// Writes a complete `application/json` response from serialised bytes.
    pub fn json(&self, status: StatusCode, body: &[u8]) -> Result<(), Error> {
        self.bytes(status, ContentType::Json, body)
    }

    /// Writes a complete response with the given content type.
    pub fn bytes(&self, status: StatusCode, content_type: ContentType, body: &[u8]) -> Result<(), Error> {
        self.insert_header(CONTENT_TYPE.as_str(), content_type.as_str())?;
        self.write_header(status);
        self.write(body)?;
        Ok(())
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.state().status
    }

    /// Whether a status (explicit or implied by a body write) has been committed.
    pub fn is_committed(&self) -> bool {
        self.state().status.is_some()
    }

    /// A copy of the body written so far.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state().body)
    }

    /// Takes the buffered response for the transport and closes the writer.
    ///
    /// A response nobody wrote to is an empty `200 OK`.
    pub(crate) fn finish(&self) -> http::Response<Full<Bytes>> {
        let mut state = self.state();
        state.sent = true;

        let status = state.status.unwrap_or(StatusCode::OK);
        let headers = std::mem::take(&mut state.headers);
        let body = std::mem::take(&mut state.body).freeze();
        drop(state);

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// A body-less response for paths that never reach a handler.
pub(crate) fn status_only(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let w = ResponseWriter::new();
        w.write_header(StatusCode::ACCEPTED);
        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(w.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn ignored_status_is_not_logged() {
        let capture = crate::testing::Capture::new();
        tracing::dispatcher::with_default(&capture.dispatch(), || {
            let w = ResponseWriter::new();
            w.write_header(StatusCode::ACCEPTED);
            w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        });
        assert!(capture.records().is_empty());
    }

    #[test]
    fn body_write_implies_ok() {
        let w = ResponseWriter::new();
        assert!(!w.is_committed());
        assert_eq!(w.write(b"hello").unwrap(), 5);
        assert_eq!(w.status(), Some(StatusCode::OK));
        assert_eq!(&w.body()[..], b"hello");
    }

    #[test]
    fn clones_share_one_buffer() {
        let w = ResponseWriter::new();
        let other = w.clone();
        other.write(b"abc").unwrap();
        w.write(b"def").unwrap();
        assert_eq!(&w.body()[..], b"abcdef");
    }

    #[test]
    fn writes_after_finish_fail() {
        let w = ResponseWriter::new();
        w.text(StatusCode::CREATED, "done").unwrap();

        let response = w.finish();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");

        assert!(matches!(w.write(b"late"), Err(Error::ResponseClosed)));
        assert!(matches!(w.insert_header("x-late", "1"), Err(Error::ResponseClosed)));
    }

    #[test]
    fn untouched_writer_finishes_as_empty_ok() {
        let response = ResponseWriter::new().finish();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn invalid_header_is_rejected() {
        let w = ResponseWriter::new();
        let err = w.insert_header("bad header", "x").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }
}
