//! Echo handler: writes the configured value as the response body.

use crate::config::EchoSource;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response};
use http_body_util::Full;

/// Serve the configured value, newline-terminated.
///
/// An `Env` source is looked up on every request, so the response tracks
/// the process environment. A lookup miss is a soft failure: the body
/// carries a resolution-failure message and the status stays 200.
pub fn handle(source: &EchoSource) -> Response<Full<Bytes>> {
    let mut body = source.resolve();
    body.push('\n');

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_echo_text() {
        let response = handle(&EchoSource::Text("hello world".to_string()));
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "hello world\n");
    }

    #[tokio::test]
    async fn test_echo_set_env_var() {
        std::env::set_var("HTTP_ECHO_HANDLER_TEST", "from the environment");
        let response = handle(&EchoSource::Env("HTTP_ECHO_HANDLER_TEST".to_string()));
        assert_eq!(response.status(), 200);
        assert_eq!(body_string(response).await, "from the environment\n");
    }

    #[tokio::test]
    async fn test_echo_unset_env_var_is_soft_failure() {
        let response = handle(&EchoSource::Env("HTTP_ECHO_HANDLER_UNSET".to_string()));
        assert_eq!(response.status(), 200);
        assert_eq!(
            body_string(response).await,
            "failed resolving env var 'HTTP_ECHO_HANDLER_UNSET'\n"
        );
    }

    #[tokio::test]
    async fn test_env_var_read_at_request_time() {
        std::env::set_var("HTTP_ECHO_HANDLER_MUTABLE", "first");
        let source = EchoSource::Env("HTTP_ECHO_HANDLER_MUTABLE".to_string());
        assert_eq!(body_string(handle(&source)).await, "first\n");

        std::env::set_var("HTTP_ECHO_HANDLER_MUTABLE", "second");
        assert_eq!(body_string(handle(&source)).await, "second\n");
    }
}
