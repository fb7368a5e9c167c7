//! Per-request access logging.
//!
//! `AccessLog` wraps a handler invocation and emits exactly one formatted
//! line per request to its sink. The response body is wrapped in a
//! [`RecordingBody`] decorator that observes the status code and the number
//! of body bytes as they pass through the transport write path, so the line
//! is emitted only after the response has been sent.
//!
//! Line format (whitespace-separated, quoted where shown):
//!
//! ```text
//! 2025/08/27 14:03:51 localhost:5678 127.0.0.1:52114 "GET / HTTP/1.1" 200 6 "curl/8.5.0" 412.3µs
//! ```

use bytes::Bytes;
use chrono::Local;
use http::header::{HOST, USER_AGENT};
use http::{Request, Response, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

const LOG_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Captured response metadata for one request.
///
/// Status stays 0 until it is recorded; the first body write defaults it
/// to 200, matching the behavior of a transport that sends a success
/// status line when the handler never set one explicitly.
#[derive(Debug, Default)]
pub struct ResponseRecord {
    status: u16,
    length: u64,
}

impl ResponseRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status code. Last write wins.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status.as_u16();
    }

    /// Record a body write of `len` bytes.
    ///
    /// Overwrites (does not accumulate) the recorded length; the handlers
    /// here write the body in a single frame.
    pub fn record_write(&mut self, len: usize) {
        if self.status == 0 {
            self.status = StatusCode::OK.as_u16();
        }
        self.length = len as u64;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

type LogSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// One pending access-log line. Emitted exactly once, on drop.
struct AccessEntry {
    sink: LogSink,
    host: String,
    remote: SocketAddr,
    method: String,
    path: String,
    proto: String,
    user_agent: String,
    start: Instant,
    record: ResponseRecord,
}

impl AccessEntry {
    /// Write the log line. Failures writing to the sink are swallowed;
    /// logging never gates the response.
    fn emit(&self) {
        let timestamp = Local::now().format(LOG_DATE_FORMAT);
        let duration = self.start.elapsed();
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(
                sink,
                "{} {} {} \"{} {} {}\" {} {} \"{}\" {:?}",
                timestamp,
                self.host,
                self.remote,
                self.method,
                self.path,
                self.proto,
                self.record.status(),
                self.record.length(),
                self.user_agent,
                duration,
            );
        }
    }
}

impl Drop for AccessEntry {
    fn drop(&mut self) {
        self.emit();
    }
}

/// Body decorator that observes writes without altering them.
///
/// Implements the same `Body` interface as the body it wraps: data frames
/// are counted into the entry's [`ResponseRecord`] and forwarded unchanged,
/// and any error comes from the inner body alone. Dropping the body (after
/// the transport finishes with it, successfully or not) emits the log line.
pub struct RecordingBody<B> {
    inner: B,
    entry: AccessEntry,
}

impl<B> Body for RecordingBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.entry.record.record_write(data.len());
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Access logger: wraps handlers so every completed request produces one
/// log line on the configured sink.
#[derive(Clone)]
pub struct AccessLog {
    sink: LogSink,
}

impl AccessLog {
    /// Log to the standard output stream.
    pub fn stdout() -> Self {
        Self::with_sink(Box::new(std::io::stdout()))
    }

    /// Log to an arbitrary sink. Used by tests to capture output.
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Invoke `handler`, timing it, and return its response with the body
    /// wrapped in a [`RecordingBody`] that emits the log line once the
    /// response has been written out.
    pub async fn call<T, F, Fut, B>(
        &self,
        req: &Request<T>,
        remote: SocketAddr,
        handler: F,
    ) -> Response<RecordingBody<B>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Response<B>>,
        B: Body<Data = Bytes>,
    {
        let start = Instant::now();
        let host = header_str(req, HOST);
        let user_agent = header_str(req, USER_AGENT);
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let proto = format!("{:?}", req.version());

        let response = handler().await;

        let (parts, body) = response.into_parts();
        let mut record = ResponseRecord::new();
        record.set_status(parts.status);

        let entry = AccessEntry {
            sink: Arc::clone(&self.sink),
            host,
            remote,
            method,
            path,
            proto,
            user_agent,
            start,
            record,
        };

        Response::from_parts(parts, RecordingBody { inner: body, entry })
    }
}

fn header_str<T>(req: &Request<T>, name: http::header::HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
