use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use kanal::{AsyncReceiver, AsyncSender};
use mdex_core::MdexError;
use mdex_types::{WorkerPayload, WorkerResult, WorkerTask};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::TaskState;

/// Program and leading arguments used to start a worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// This executable re-invoked with the hidden `worker` subcommand
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }
}

/// Starts one worker process per task and supervises it to a terminal state
#[derive(Debug)]
pub struct WorkerLauncher {
    command: WorkerCommand,
    envs: Vec<(OsString, OsString)>,
    timeout: Duration,
    capacity: usize,
    cancel: CancellationToken,
}

impl WorkerLauncher {
    pub fn new(
        command: WorkerCommand,
        timeout: Duration,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            command,
            envs: Vec::new(),
            timeout,
            capacity: capacity.max(1),
            cancel,
        }
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Run `task` in a fresh worker process.
    ///
    /// The child is killed and reaped on every exit path.
    pub async fn run(&self, task: WorkerTask) -> Result<WorkerPayload, MdexError> {
        let mut child = self.spawn()?;
        info!(task = task.name(), id = task.id(), pid = child.id(), "worker started");

        let Some(stdout) = child.stdout.take() else {
            self.reap(&mut child).await;
            return Err(MdexError::WorkerFailure("worker stdout was not captured".into()));
        };
        self.send_task(&mut child, &task).await;

        let (tx, rx) = kanal::bounded_async(self.capacity);
        let reader = tokio::spawn(forward_results(stdout, tx));

        let state = self.supervise(&task, &mut child, &rx).await;
        self.reap(&mut child).await;
        reader.abort();

        match &state {
            TaskState::Done(_) => info!(task = task.name(), id = task.id(), "worker finished"),
            TaskState::Failed(reason) => {
                warn!(task = task.name(), id = task.id(), "worker failed: {reason}")
            }
            _ => {}
        }
        state.into_result()
    }

    fn spawn(&self) -> Result<Child, MdexError> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        command.spawn().map_err(|e| {
            MdexError::WorkerFailure(format!(
                "failed to start {}: {e}",
                self.command.program.display()
            ))
        })
    }

    /// A worker that never reads its task still reports through its exit status
    async fn send_task(&self, child: &mut Child, task: &WorkerTask) {
        let Some(mut stdin) = child.stdin.take() else {
            return;
        };
        let line = match serde_json::to_string(task) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to encode worker task: {e}");
                return;
            }
        };

        let sent = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        }
        .await;
        if let Err(e) = sent {
            warn!(task = task.name(), "failed to send task to worker: {e}");
        }
    }

    async fn supervise(
        &self,
        task: &WorkerTask,
        child: &mut Child,
        rx: &AsyncReceiver<WorkerResult>,
    ) -> TaskState {
        let deadline = Instant::now() + self.timeout;
        let mut state = TaskState::Requested.start();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return state.fail("cancelled"),
                _ = sleep_until(deadline) => {
                    return state.fail(format!("timed out after {:?}", self.timeout));
                }
                received = rx.recv() => match received {
                    Ok(result) => {
                        debug!(task = task.name(), ?result, "worker result");
                        state = state.on_result(task, result);
                        if state.is_terminal() {
                            return state;
                        }
                    }
                    // stdout reached EOF
                    Err(_) => break,
                },
            }
        }

        tokio::select! {
            _ = self.cancel.cancelled() => state.fail("cancelled"),
            exited = timeout_at(deadline, child.wait()) => match exited {
                Ok(Ok(status)) => state.on_exit(status.success(), &status.to_string()),
                Ok(Err(e)) => state.fail(format!("failed to wait for worker: {e}")),
                Err(_) => state.fail(format!("timed out after {:?}", self.timeout)),
            },
        }
    }

    async fn reap(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            debug!("worker already exited: {e}");
        }
        match child.wait().await {
            Ok(status) => debug!(%status, "worker reaped"),
            Err(e) => warn!("failed to reap worker: {e}"),
        }
    }
}

/// Parse stdout line by line. Lines that are not a result are skipped.
async fn forward_results(stdout: ChildStdout, tx: AsyncSender<WorkerResult>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerResult>(&line) {
                    Ok(result) => {
                        if tx.send(result).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(line, "ignoring malformed worker output: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("failed to read worker output: {e}");
                break;
            }
        }
    }
}
