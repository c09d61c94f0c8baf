//! TCP server for handling log submission connections.
//!
//! Accepts connections and runs one handler task per client. Each handler
//! processes exactly one frame: read it under the configured deadline,
//! decode it, check the client's rate limit, append the formatted entry,
//! and reply. Framing and decode failures close the connection without a
//! response; rate-limit rejections get an explicit message. A failed
//! append is logged and the client receives no confirmation.

use crate::appender::LogAppender;
use crate::config::Config;
use crate::framing::{self, FrameError};
use crate::limiter::RateLimiter;
use crate::protocol;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Server instance
pub struct Server {
    config: Arc<Config>,
    limiter: Arc<RateLimiter>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.max_per_second));

        Server {
            config: Arc::new(config),
            limiter,
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Bind, serve until interrupted, then drain in-flight handlers.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let appender = Arc::new(LogAppender::open(&self.config.log_file).await?);
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(address = %listener.local_addr()?, "Server listening");

        tokio::select! {
            result = self.serve(listener, appender) => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
            }
        }

        // New connections are no longer accepted; wait for live handlers
        let _ = self.connection_limit.acquire_many(MAX_CONNECTIONS as u32).await?;
        info!("All connections drained");
        Ok(())
    }

    /// Accept connections and dispatch each to a handler task.
    async fn serve(
        &self,
        listener: TcpListener,
        appender: Arc<LogAppender>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "New connection");

                    let config = Arc::clone(&self.config);
                    let limiter = Arc::clone(&self.limiter);
                    let appender = Arc::clone(&appender);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, config, limiter, appender).await
                        {
                            debug!(%peer, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle a single client connection: one frame, one response, then close.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    limiter: Arc<RateLimiter>,
    appender: Arc<LogAppender>,
) -> std::io::Result<()> {
    let client = peer.ip().to_string();

    // AwaitingFrame: framing failures close without a response
    let frame = match framing::read_frame(&mut stream, config.read_timeout).await {
        Ok(frame) => frame,
        Err(FrameError::Empty) => {
            debug!(%peer, "No data received, closing connection");
            return Ok(());
        }
        Err(FrameError::Timeout) => {
            debug!(%peer, "Timed out waiting for a complete frame");
            return Ok(());
        }
        Err(FrameError::Closed) => {
            debug!(%peer, "Connection closed mid-frame");
            return Ok(());
        }
        Err(FrameError::Io(e)) => return Err(e),
    };

    // Decoding: malformed input closes silently, logged for operators
    let record = match protocol::decode(&frame, &client) {
        Ok(record) => record,
        Err(e) => {
            warn!(%peer, error = %e, "Malformed log payload");
            return Ok(());
        }
    };

    // RateChecking: rejection is the one failure the client hears about
    if !limiter.admit(&client) {
        debug!(%peer, "Rate limit exceeded");
        stream
            .write_all(protocol::RESPONSE_RATE_LIMITED.as_bytes())
            .await?;
        return Ok(());
    }

    // Writing: a lost entry is surfaced to operators, not to the client
    let entry = config.template.render(&record, &config.utc_offset);
    if let Err(e) = appender.append(&entry).await {
        error!(%peer, error = %e, "Failed to write log entry");
        return Ok(());
    }
    debug!(%peer, %entry, "Logged message");

    // Responding
    stream
        .write_all(protocol::response_logged(&entry).as_bytes())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Template;
    use chrono::FixedOffset;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn test_config(log_file: PathBuf, max_per_second: u32, read_timeout: Duration) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_file,
            max_per_second,
            template: Template::parse(
                "[{timestamp}] {client} {level}: {message} (ID: {correlationId})",
            )
            .unwrap(),
            read_timeout,
            utc_offset: FixedOffset::east_opt(-5 * 3600).unwrap(),
            workers: None,
            log_level: "info".to_string(),
        }
    }

    async fn spawn_server(config: Config) -> SocketAddr {
        let appender = Arc::new(LogAppender::open(&config.log_file).await.unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Server::new(config);
        tokio::spawn(async move {
            let _ = server.serve(listener, appender).await;
        });
        addr
    }

    async fn exchange(addr: SocketAddr, payload: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_logs_well_formed_message() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_secs(5))).await;

        let response =
            exchange(addr, b"{\"logLevel\":\"ERROR\",\"logMessage\":\"disk full\"}\n").await;

        assert!(response.starts_with("Logged: "));
        assert!(response.contains("ERROR"));
        assert!(response.contains("disk full"));
        assert!(response.contains("127.0.0.1"));

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("ERROR"));
        assert!(lines[0].contains("disk full"));
        assert!(lines[0].contains("127.0.0.1"));
        assert_eq!(response, format!("Logged: {}", lines[0]));
    }

    #[tokio::test]
    async fn test_empty_object_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_secs(5))).await;

        let response = exchange(addr, b"{}\n").await;

        assert!(response.contains("INFO"));
        assert!(response.contains("No message provided"));

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("No message provided"));
    }

    #[tokio::test]
    async fn test_rate_limited_client_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 1, Duration::from_secs(5))).await;

        let first = exchange(addr, b"{\"logMessage\":\"one\"}\n").await;
        let second = exchange(addr, b"{\"logMessage\":\"two\"}\n").await;

        assert!(first.starts_with("Logged: "));
        assert_eq!(second, "Rate limit exceeded. Please slow down.");

        // The rejected message never reaches the log
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("one"));
        assert!(!contents.contains("two"));
    }

    #[tokio::test]
    async fn test_malformed_payload_closed_silently() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_secs(5))).await;

        let response = exchange(addr, b"this is not json\n").await;
        assert!(response.is_empty());

        // Well-formed JSON that is not an object is malformed too
        let response = exchange(addr, b"[\"an\",\"array\"]\n").await;
        assert!(response.is_empty());

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.is_empty());

        // The connection slot is reusable afterwards
        let response = exchange(addr, b"{}\n").await;
        assert!(response.starts_with("Logged: "));
    }

    #[tokio::test]
    async fn test_idle_client_closed_without_response() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_millis(100))).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.is_empty());
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn test_partial_frame_then_close_gets_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_secs(5))).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"{\"logMessage\":").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.is_empty());

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_clients_each_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let addr =
            spawn_server(test_config(log_path.clone(), 100, Duration::from_secs(5))).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            handles.push(tokio::spawn(async move {
                let payload = format!("{{\"logMessage\":\"msg-{i:02}\"}}\n");
                exchange(addr, payload.as_bytes()).await
            }));
        }
        for handle in handles {
            let response = handle.await.unwrap();
            assert!(response.starts_with("Logged: "));
        }

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 20);
        for line in &lines {
            assert!(line.contains("msg-"));
            assert!(line.ends_with(")"));
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_write_failure_gets_no_confirmation() {
        let addr = spawn_server(test_config(
            PathBuf::from("/dev/full"),
            100,
            Duration::from_secs(5),
        ))
        .await;

        let response = exchange(addr, b"{\"logMessage\":\"lost\"}\n").await;
        assert!(response.is_empty());
    }
}
