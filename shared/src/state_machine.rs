//! Connection State Machine
//!
//! Defines the valid lifecycle of one request/response connection. There are
//! no retries: once `Closed`, a connection accepts no further events.

/// Lifecycle states of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    AwaitRequest,
    Decoded,
    CredentialsMerged,
    Executing,
    Streaming,
    Completed,
    StatusReported,
    FailedReported,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Events that drive a connection forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Listener handed the connection over
    Accepted,
    /// Request line parsed and validated
    RequestDecoded,
    /// Request line malformed, oversized or missing
    RequestRejected,
    /// Credential store rewritten with the request's entries
    CredentialsMerged,
    /// Credential entries invalid or store unusable
    CredentialsRejected,
    /// About to spawn the child
    ExecutionStarted,
    /// Child could not be spawned
    SpawnFailed,
    /// Child is running and its output is being pumped
    Spawned,
    /// Child exited (or was killed) and both pipes are drained
    ChildExited,
    /// Status trailer written after completion
    StatusWritten,
    /// Connection shut down
    Disconnected,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: ConnectionEvent,
    },
}

/// Tracks the lifecycle of a single connection
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a new state machine in Init state
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Init,
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ConnectionEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent::*;
        use ConnectionState as S;

        match (self.current_state, event) {
            (S::Init, Accepted) => Some(S::AwaitRequest),

            (S::AwaitRequest, RequestDecoded) => Some(S::Decoded),
            (S::AwaitRequest, RequestRejected) => Some(S::FailedReported),

            (S::Decoded, ConnectionEvent::CredentialsMerged) => Some(S::CredentialsMerged),
            (S::Decoded, CredentialsRejected) => Some(S::FailedReported),

            (S::CredentialsMerged, ExecutionStarted) => Some(S::Executing),

            (S::Executing, SpawnFailed) => Some(S::FailedReported),
            (S::Executing, ConnectionEvent::Spawned) => Some(S::Streaming),

            (S::Streaming, ChildExited) => Some(S::Completed),

            (S::Completed, StatusWritten) => Some(S::StatusReported),

            // Closed is terminal; everything else may be torn down
            (S::Closed, _) => None,
            (_, Disconnected) => Some(S::Closed),

            _ => None,
        }
    }
}
