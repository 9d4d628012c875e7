//! Individual connection handling

use crate::command::{CommandExecutor, SessionWriter};
use crate::credentials::CredentialStore;
use crate::error::ConnectionError;
use build_runner_shared::{
    codec::{ProtocolError, RequestDecoder},
    state_machine::{ConnectionEvent, ConnectionState, ConnectionStateMachine, TransitionResult},
    status::render_trailer,
    ExecutionResult, Request,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Runs the request/response cycle for one connection at a time
///
/// Shared between connections in persistent mode; all per-connection state
/// lives on the stack of [`handle`](Self::handle).
pub struct ConnectionHandler {
    store: Arc<CredentialStore>,
    executor: CommandExecutor,
    max_request_bytes: usize,
}

/// Per-connection bookkeeping
struct Session<'a> {
    peer: &'a str,
    fsm: ConnectionStateMachine,
}

impl Session<'_> {
    fn advance(&mut self, event: ConnectionEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success(state) => {
                debug!("[{}] {:?} -> {:?}", self.peer, event, state);
            }
            TransitionResult::Invalid { from, event } => {
                warn!("[{}] Ignoring {:?} in state {:?}", self.peer, event, from);
            }
        }
    }
}

impl ConnectionHandler {
    pub fn new(store: Arc<CredentialStore>, executor: CommandExecutor, max_request_bytes: usize) -> Self {
        Self {
            store,
            executor,
            max_request_bytes,
        }
    }

    /// Serve one connection to completion
    ///
    /// Every outcome, including malformed input, ends with the status
    /// trailer as the last bytes written before the connection is closed.
    pub async fn handle<S>(&self, stream: S, peer: &str) -> ExecutionResult
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut session = Session {
            peer,
            fsm: ConnectionStateMachine::new(),
        };
        session.advance(ConnectionEvent::Accepted);

        let (mut reader, writer) = tokio::io::split(stream);
        let remote = SessionWriter::new(writer);

        let result = match self.process(&mut reader, &remote, &mut session).await {
            Ok(()) => ExecutionResult::success(),
            Err(e) => {
                error!("[{}] {}", peer, e);
                ExecutionResult::failed(e.to_string())
            }
        };

        let trailer = render_trailer(&result);
        if remote.is_broken().await {
            warn!("[{}] Client went away before the status was sent", peer);
        } else if let Err(e) = remote.write_line_start(trailer.as_bytes()).await {
            warn!("[{}] Could not send status: {}", peer, e);
        }
        if session.fsm.state() == ConnectionState::Completed {
            session.advance(ConnectionEvent::StatusWritten);
        }
        if let Err(e) = remote.shutdown().await {
            debug!("[{}] Shutdown failed: {}", peer, e);
        }
        session.advance(ConnectionEvent::Disconnected);

        info!("[{}] {}", peer, trailer.lines().last().unwrap_or_default());
        result
    }

    async fn process<R>(
        &self,
        reader: &mut R,
        remote: &SessionWriter,
        session: &mut Session<'_>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let request = match self.read_request(reader).await {
            Ok(request) => {
                session.advance(ConnectionEvent::RequestDecoded);
                request
            }
            Err(e) => {
                session.advance(ConnectionEvent::RequestRejected);
                return Err(e.into());
            }
        };

        if !request.credentials.is_empty() {
            info!(
                "[{}] Applying credentials for {:?}",
                session.peer,
                request.registries()
            );
        }

        // Credentials are on disk before the command can look for them
        match self.store.apply(&request.credentials).await {
            Ok(_) => session.advance(ConnectionEvent::CredentialsMerged),
            Err(e) => {
                session.advance(ConnectionEvent::CredentialsRejected);
                return Err(e.into());
            }
        }

        session.advance(ConnectionEvent::ExecutionStarted);
        let running = match self.executor.spawn(&request.command, remote) {
            Ok(running) => {
                session.advance(ConnectionEvent::Spawned);
                running
            }
            Err(e) => {
                session.advance(ConnectionEvent::SpawnFailed);
                return Err(e.into());
            }
        };

        let outcome = running.wait().await;
        session.advance(ConnectionEvent::ChildExited);
        outcome.map_err(Into::into)
    }

    /// Read bytes until the request line is complete
    async fn read_request<R>(&self, reader: &mut R) -> Result<Request, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut decoder = RequestDecoder::with_limit(self.max_request_bytes);
        let mut read_buf = vec![0u8; 4096];

        loop {
            if let Some(request) = decoder.decode_next()? {
                return Ok(request);
            }

            let n = reader.read(&mut read_buf).await?;
            if n == 0 {
                return Err(decoder.finish());
            }
            decoder.extend(&read_buf[..n]);
        }
    }
}
