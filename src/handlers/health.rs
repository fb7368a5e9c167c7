//! Health handler: fixed liveness payload.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response};
use http_body_util::Full;

const HEALTH_BODY: &str = "{\"status\":\"ok\"}\n";

/// Serve the liveness payload. Always succeeds, for any method or path.
pub fn handle() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(HEALTH_BODY.as_bytes())));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
