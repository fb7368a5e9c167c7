//! HTTP server: listener, routing, and graceful shutdown.
//!
//! Each accepted connection is served by hyper's HTTP/1.1 connection
//! driver on its own task. The root path (and any other unrouted path)
//! goes to the access-logged echo handler; `/health` answers the liveness
//! probe without touching the access log.

use crate::access_log::AccessLog;
use crate::config::{Config, EchoSource};
use crate::handlers::{echo, health, with_app_headers};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Bound on draining in-flight requests during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared per-process state, fixed at startup
struct AppState {
    echo: EchoSource,
    access_log: AccessLog,
}

/// Server instance
pub struct Server {
    listen: String,
    state: Arc<AppState>,
}

impl Server {
    /// Create a new server instance logging requests to stdout
    pub fn new(config: Config) -> Self {
        Self::with_access_log(config, AccessLog::stdout())
    }

    /// Create a server with a custom access-log sink (used by tests)
    pub fn with_access_log(config: Config, access_log: AccessLog) -> Self {
        Server {
            listen: config.listen,
            state: Arc::new(AppState {
                echo: config.echo,
                access_log,
            }),
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(&self.listen).await
    }

    /// Accept connections until `shutdown` fires, then stop accepting and
    /// drain in-flight connections, bounded by [`SHUTDOWN_TIMEOUT`].
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        debug!(peer = %remote, "New connection");

                        let state = Arc::clone(&self.state);
                        let service = service_fn(move |req: Request<Incoming>| {
                            let state = Arc::clone(&state);
                            async move { Ok::<_, Infallible>(route(req, remote, &state).await) }
                        });

                        let conn = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service);
                        let conn = graceful.watch(conn);

                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                debug!(error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        // Stop accepting immediately; give in-flight requests a bounded
        // window to finish.
        drop(listener);
        info!("Draining in-flight connections");

        tokio::select! {
            _ = graceful.shutdown() => Ok(()),
            _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                Err("graceful shutdown timed out".into())
            }
        }
    }
}

/// Dispatch one request to its handler.
async fn route(
    req: Request<Incoming>,
    remote: SocketAddr,
    state: &AppState,
) -> Response<BoxBody<Bytes, Infallible>> {
    match req.uri().path() {
        "/health" => with_app_headers(health::handle()).map(BoxBody::new),
        // The root handler is the catch-all, like a mux "/" pattern.
        _ => {
            let response = state
                .access_log
                .call(&req, remote, || async {
                    with_app_headers(echo::handle(&state.echo))
                })
                .await;
            response.map(BoxBody::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::assert_ok;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            // Explicit extend, not Write::write: AsyncWriteExt is in scope
            // here and would make the call ambiguous.
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_config(echo: EchoSource) -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            echo,
            log_level: "info".to_string(),
        }
    }

    /// Bind an ephemeral port and run the server in the background.
    async fn start(
        echo: EchoSource,
        log: AccessLog,
    ) -> (
        SocketAddr,
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<(), String>>,
    ) {
        let server = Server::with_access_log(test_config(echo), log);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            server
                .serve(listener, shutdown_rx)
                .await
                .map_err(|e| e.to_string())
        });
        (addr, shutdown_tx, handle)
    }

    /// The log line lands when the server drops the response body, which can
    /// trail the client seeing EOF by a moment.
    async fn wait_for_lines(buf: &SharedBuf, n: usize) {
        for _ in 0..100 {
            if buf.contents().lines().count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} access-log lines, got: {:?}", buf.contents());
    }

    async fn raw_request(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {target} HTTP/1.1\r\n\
             Host: localhost\r\n\
             User-Agent: server-test/1.0\r\n\
             Connection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_echo_over_socket() {
        let buf = SharedBuf::default();
        let log = AccessLog::with_sink(Box::new(buf.clone()));
        let (addr, shutdown_tx, handle) =
            start(EchoSource::Text("hello".to_string()), log).await;

        let response = raw_request(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("hello\n"));

        // Exactly one access-log line for the echoed request.
        wait_for_lines(&buf, 1).await;
        assert_eq!(buf.contents().lines().count(), 1);
        assert!(buf.contents().contains("\"GET / HTTP/1.1\" 200 6"));

        shutdown_tx.send(true).unwrap();
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_health_over_socket() {
        let buf = SharedBuf::default();
        let log = AccessLog::with_sink(Box::new(buf.clone()));
        let (addr, shutdown_tx, handle) =
            start(EchoSource::Text("unused".to_string()), log).await;

        let response = raw_request(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("{\"status\":\"ok\"}\n"));

        shutdown_tx.send(true).unwrap();
        assert_ok!(handle.await.unwrap());

        // Health checks stay out of the access log. Checked after the
        // drain so any stray line would already have landed.
        assert_eq!(buf.contents(), "");
    }

    #[tokio::test]
    async fn test_unrouted_path_hits_echo_handler() {
        let buf = SharedBuf::default();
        let log = AccessLog::with_sink(Box::new(buf.clone()));
        let (addr, shutdown_tx, handle) =
            start(EchoSource::Text("root".to_string()), log).await;

        let response = raw_request(addr, "/anything/else").await;
        assert!(response.ends_with("root\n"));
        wait_for_lines(&buf, 1).await;
        assert!(buf.contents().contains("\"GET /anything/else HTTP/1.1\""));

        shutdown_tx.send(true).unwrap();
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_inflight_request_completes_during_drain() {
        let log = AccessLog::with_sink(Box::new(SharedBuf::default()));
        let (addr, shutdown_tx, handle) =
            start(EchoSource::Text("still here".to_string()), log).await;

        // Connection accepted and request underway before the interrupt.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        // Give the accept loop a chance to pick the connection up, so the
        // interrupt lands with the request genuinely in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();

        // Finish the request inside the drain window; it must still be
        // served to completion.
        stream
            .write_all(b"Host: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("still here\n"));

        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_connections() {
        let log = AccessLog::with_sink(Box::new(SharedBuf::default()));
        let (addr, shutdown_tx, handle) =
            start(EchoSource::Text("bye".to_string()), log).await;

        shutdown_tx.send(true).unwrap();
        assert_ok!(handle.await.unwrap());

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
