//! Accept loop: single-shot or persistent

use super::connection::ConnectionHandler;
use crate::transport::{Accepted, Listener};
use build_runner_shared::ExecutionResult;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Owns the listener and hands each accepted connection to the handler
pub struct Dispatcher {
    listener: Listener,
    handler: Arc<ConnectionHandler>,
    grace_period: Duration,
}

impl Dispatcher {
    pub fn new(listener: Listener, handler: ConnectionHandler, grace_period: Duration) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
            grace_period,
        }
    }

    pub fn local_description(&self) -> String {
        self.listener.local_description()
    }

    /// Serve exactly one connection, then linger for the grace period
    ///
    /// The listener is closed before the pause, so nothing else is accepted
    /// while the process winds down.
    pub async fn serve_once(self) -> io::Result<ExecutionResult> {
        let Accepted { stream, peer } = self.listener.accept().await?;
        info!("Accepted {} connection from {}", self.listener.name(), peer);
        drop(self.listener);

        let result = self.handler.handle(stream, &peer).await;

        tokio::time::sleep(self.grace_period).await;
        Ok(result)
    }

    /// Serve connections until the process is stopped
    ///
    /// Each connection runs on its own task. A failed accept is logged and
    /// the loop keeps going.
    pub async fn serve_forever(self) {
        loop {
            let Accepted { stream, peer } = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            info!("Accepted {} connection from {}", self.listener.name(), peer);

            let handler = self.handler.clone();
            tokio::spawn(async move {
                handler.handle(stream, &peer).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandExecutor;
    use crate::credentials::CredentialStore;
    use build_runner_shared::{client, Request, TerminalState};
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};
    use tokio::net::TcpStream;

    async fn dispatcher(dir: &TempDir, address: &str, grace_period: Duration) -> Dispatcher {
        let listener = Listener::bind_str(address).await.unwrap();
        let handler = ConnectionHandler::new(
            Arc::new(CredentialStore::new(dir.path().join("config.json"))),
            CommandExecutor::default(),
            64 * 1024,
        );
        Dispatcher::new(listener, handler, grace_period)
    }

    async fn submit_tcp(description: &str, request: &Request) -> client::Response {
        let addr = description.trim_start_matches("tcp://");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        client::submit(&mut stream, request).await.unwrap()
    }

    #[tokio::test]
    async fn test_single_shot_waits_out_grace_period() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher(&dir, "tcp://127.0.0.1:0", Duration::from_millis(300)).await;
        let description = dispatcher.local_description();

        let server = tokio::spawn(dispatcher.serve_once());
        let response = submit_tcp(&description, &Request::new(["false"])).await;
        let answered = Instant::now();

        let result = server.await.unwrap().unwrap();
        assert!(answered.elapsed() >= Duration::from_millis(250));
        assert_eq!(result.state, TerminalState::Failed);
        assert_eq!(response.status(), Some(TerminalState::Failed));
    }

    #[tokio::test]
    async fn test_single_shot_stops_listening() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher(&dir, "tcp://127.0.0.1:0", Duration::from_millis(500)).await;
        let description = dispatcher.local_description();

        let server = tokio::spawn(dispatcher.serve_once());
        let response = submit_tcp(&description, &Request::new(["true"])).await;
        assert!(response.succeeded());

        let addr = description.trim_start_matches("tcp://");
        assert!(TcpStream::connect(addr).await.is_err());
        assert!(server.await.unwrap().unwrap().is_success());
    }

    #[tokio::test]
    async fn test_persistent_connections_are_isolated() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher(&dir, "tcp://127.0.0.1:0", Duration::ZERO).await;
        let description = dispatcher.local_description();
        let server = tokio::spawn(dispatcher.serve_forever());

        let script = |word: &str| {
            Request::new([
                "sh".to_string(),
                "-c".to_string(),
                format!("for i in 1 2 3 4 5; do echo {word}; sleep 0.05; done"),
            ])
        };
        let (alpha, bravo) = (script("alpha"), script("bravo"));
        let (a, b) = tokio::join!(
            submit_tcp(&description, &alpha),
            submit_tcp(&description, &bravo),
        );

        assert_eq!(a.text(), "alpha\n".repeat(5) + "status: SUCCESS\n");
        assert_eq!(b.text(), "bravo\n".repeat(5) + "status: SUCCESS\n");
        server.abort();
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_persistent_loop() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher(&dir, "tcp://127.0.0.1:0", Duration::ZERO).await;
        let description = dispatcher.local_description();
        let server = tokio::spawn(dispatcher.serve_forever());

        let failed = submit_tcp(&description, &Request::new(["no-such-binary-for-runner-tests"])).await;
        assert_eq!(failed.status(), Some(TerminalState::Failed));

        let ok = submit_tcp(&description, &Request::new(["echo", "still here"])).await;
        assert_eq!(ok.bytes(), b"still here\nstatus: SUCCESS\n");
        server.abort();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_end_to_end() {
        use tokio::net::UnixStream;

        let dir = tempdir().unwrap();
        let socket = dir.path().join("runner.sock");
        let address = format!("unix://{}", socket.display());
        let dispatcher = dispatcher(&dir, &address, Duration::ZERO).await;

        let server = tokio::spawn(dispatcher.serve_once());
        let mut stream = UnixStream::connect(&socket).await.unwrap();
        let response = client::submit(&mut stream, &Request::new(["echo", "over unix"]))
            .await
            .unwrap();

        assert_eq!(response.bytes(), b"over unix\nstatus: SUCCESS\n");
        assert!(server.await.unwrap().unwrap().is_success());
    }
}
