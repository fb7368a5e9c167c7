//! Request handlers.
//!
//! - `echo`: serves the configured value on the root path
//! - `health`: fixed liveness payload for orchestration probes

pub mod echo;
pub mod health;

use http::Response;

/// Pass-through hook for attaching application headers such as
/// X-App-Version and X-App-Name. Currently adds nothing.
pub fn with_app_headers<B>(response: Response<B>) -> Response<B> {
    response
}
