//! Command executor - spawns the requested command and waits for it

use super::multiplexer::{pump, ConsoleSink, SessionWriter};
use crate::error::ExecutionError;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long pipes may stay open once a timed-out child has been killed
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

enum Waited {
    Exited(io::Result<ExitStatus>),
    TimedOut(Duration),
}

/// Runs one command per request, streaming its output to the client
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    /// Upper bound on the child's run time; `None` waits indefinitely
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Spawn `command` and start mirroring its output to the console and
    /// `remote`
    pub fn spawn(
        &self,
        command: &[String],
        remote: &SessionWriter,
    ) -> Result<RunningCommand, ExecutionError> {
        let (program, args) = match command.split_first() {
            Some((program, args)) if !program.is_empty() => (program.clone(), args),
            _ => return Err(ExecutionError::EmptyCommand),
        };

        info!("Running command: {:?}", command);

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout can take down everything the command started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, ConsoleSink::Stdout, remote.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, ConsoleSink::Stderr, remote.clone())));

        Ok(RunningCommand {
            program,
            child,
            stdout_task,
            stderr_task,
            timeout: self.timeout,
        })
    }

}

/// A spawned child whose output is being pumped
pub struct RunningCommand {
    program: String,
    child: Child,
    stdout_task: Option<JoinHandle<io::Result<u64>>>,
    stderr_task: Option<JoinHandle<io::Result<u64>>>,
    timeout: Option<Duration>,
}

impl RunningCommand {
    /// Wait for the child to exit and for both pipes to be drained
    ///
    /// Anything written to the client after this returns follows every byte
    /// of the child's output.
    pub async fn wait(mut self) -> Result<(), ExecutionError> {
        let program = self.program;

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(status) => Waited::Exited(status),
                Err(_) => {
                    warn!("{} exceeded {:?}, killing it", program, limit);
                    terminate(&mut self.child, &program).await;
                    Waited::TimedOut(limit)
                }
            },
            None => Waited::Exited(self.child.wait().await),
        };

        // After a kill, a survivor holding the pipes must not hold the request
        let deadline = match waited {
            Waited::TimedOut(_) => Some(DRAIN_AFTER_KILL),
            Waited::Exited(_) => None,
        };
        drain(self.stdout_task, "stdout", deadline).await;
        drain(self.stderr_task, "stderr", deadline).await;

        match waited {
            Waited::Exited(Ok(status)) if status.success() => {
                debug!("{} exited successfully", program);
                Ok(())
            }
            Waited::Exited(Ok(status)) => Err(ExecutionError::NonZeroExit { program, status }),
            Waited::Exited(Err(source)) => Err(ExecutionError::Wait { program, source }),
            Waited::TimedOut(timeout) => Err(ExecutionError::TimedOut { timeout }),
        }
    }
}

/// Kill the child and, on unix, every process in its group
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("killpg for {} failed: {}", program, e);
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}: {}", program, e);
    }
}

async fn drain(
    task: Option<JoinHandle<io::Result<u64>>>,
    stream: &str,
    deadline: Option<Duration>,
) {
    let Some(mut task) = task else {
        return;
    };

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Child {} still open {:?} after kill, abandoning it", stream, limit);
                task.abort();
                return;
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Reading child {} failed: {}", stream, e),
        Err(e) => warn!("Copy task for child {} failed: {}", stream, e),
    }
}
