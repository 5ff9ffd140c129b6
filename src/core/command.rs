//! Command execution for running one external process at a time
//!
//! [`CommandActor`] owns at most one live session: a child process, the task
//! streaming its stdout, and the cancellation token tying the two together.
//! Spawning a new session always supersedes the previous one first: the token
//! is cancelled, the child is killed and the streaming task is awaited, so no
//! output of the old process can be delivered after the new one starts.

use crate::core::actor::{ActorController, ActorSendError};
use crate::core::message::Message;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long to wait for the stderr reader once the process has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No process running
    Idle,
    /// Command built, process launch requested
    Starting,
    /// Process stdout is being consumed
    Streaming,
    /// Process exited with an accepted status
    Completed,
    /// Process was killed because a newer session replaced it
    Superseded,
    /// Process could not be launched or exited unexpectedly
    Failed,
}

impl SessionState {
    /// Whether a process may still be producing output.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Streaming)
    }
}

/// Error types for command execution
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("{0}: command not found")]
    ToolNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stdout pipe not available")]
    StdoutNotAvailable,

    #[error("Failed to read from stdout: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to wait for command: {0}")]
    WaitFailed(#[source] std::io::Error),

    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: Option<String>,
    },

    #[error("Command execution was cancelled")]
    Cancelled,
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    stderr
        .as_deref()
        .map(|line| format!(": {}", line))
        .unwrap_or_default()
}

/// Converts stdout lines of one session into outbound messages.
///
/// A fresh handler is created for every session, so per-session state (like
/// the file path cache of the line parser) never leaks across revisions.
pub trait CommandHandler<T>: Send + 'static {
    /// Item produced from one stdout line.
    type Item: Send + 'static;

    /// Process a single line of stdout. Returning `None` drops the line.
    fn on_stdout(&mut self, line: String) -> Option<Self::Item>;

    /// Wrap a batch of items, in arrival order, into an outbound message.
    fn on_batch(&mut self, items: Vec<Self::Item>) -> Message<T>;

    /// Produce the final message once the process is done.
    ///
    /// Not called for superseded sessions.
    fn on_complete(&mut self, result: &Result<(), CommandError>) -> Option<Message<T>>;
}

/// Tuning knobs for streaming stdout.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Maximum number of items per delivered batch
    pub batch_size: usize,
    /// Maximum time a partially filled batch is held back
    pub flush_interval: Duration,
    /// Exit codes treated as a successful run
    pub accepted_exit_codes: Vec<i32>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush_interval: Duration::from_millis(30),
            accepted_exit_codes: vec![0],
        }
    }
}

/// The live subprocess of one session plus the task consuming it.
struct SessionHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Read-only handle on a [`CommandActor`]'s session state.
#[derive(Debug, Clone)]
pub struct StateView {
    state: Arc<Mutex<SessionState>>,
}

impl StateView {
    pub fn get(&self) -> SessionState {
        read_state(&self.state)
    }
}

/// Runs external commands one at a time and streams their output.
pub struct CommandActor<T: Send + 'static> {
    controller: ActorController<T>,
    options: StreamOptions,
    state: Arc<Mutex<SessionState>>,
    current: Option<SessionHandle>,
}

impl<T: Send + 'static> CommandActor<T> {
    pub fn new(controller: ActorController<T>, options: StreamOptions) -> Self {
        Self {
            controller,
            options,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            current: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        read_state(&self.state)
    }

    /// Shared view of the session state, usable after the actor moved into a task.
    pub fn state_view(&self) -> StateView {
        StateView {
            state: self.state.clone(),
        }
    }

    /// Controller used for outbound messages.
    pub fn controller(&self) -> &ActorController<T> {
        &self.controller
    }

    /// Kill any session and go back to Idle, for a query that needs no search.
    pub async fn reset(&mut self) {
        self.kill().await;
        set_state(&self.state, SessionState::Idle);
    }

    /// Record a session that failed before any process was launched.
    pub async fn fail(&mut self) {
        self.kill().await;
        set_state(&self.state, SessionState::Failed);
    }

    /// Spawn `argv` in `cwd` as the new session, superseding any running one.
    pub async fn spawn<H>(
        &mut self,
        argv: &[String],
        cwd: Option<&Path>,
        handler: H,
    ) -> Result<(), CommandError>
    where
        H: CommandHandler<T>,
    {
        self.kill().await;
        set_state(&self.state, SessionState::Starting);

        let child = match Self::launch(argv, cwd) {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to start command: {}", e);
                set_state(&self.state, SessionState::Failed);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        set_state(&self.state, SessionState::Streaming);
        let task = tokio::spawn(run_session(
            argv[0].clone(),
            child,
            handler,
            self.controller.clone(),
            token.clone(),
            self.state.clone(),
            self.options.clone(),
        ));

        self.current = Some(SessionHandle { token, task });
        Ok(())
    }

    /// Terminate the running session, if any.
    ///
    /// Returns once the session task has stopped; after that no message from
    /// it can be sent. Returns `true` if a session was still active.
    pub async fn kill(&mut self) -> bool {
        let Some(handle) = self.current.take() else {
            return false;
        };

        let was_active = self.state().is_active();
        handle.token.cancel();
        if let Err(e) = handle.task.await {
            log::warn!("Session task ended abnormally: {}", e);
        }
        if was_active {
            log::info!("Killed running command session");
        }
        was_active
    }

    /// Wait for the running session to finish on its own.
    pub async fn wait(&mut self) -> SessionState {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.task.await {
                log::warn!("Session task ended abnormally: {}", e);
            }
        }
        self.state()
    }

    fn launch(argv: &[String], cwd: Option<&Path>) -> Result<Child, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::EmptyCommand)?;
        log::debug!("Executing command: {:?} (cwd: {:?})", argv, cwd);

        let mut command = Command::new(program);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::SpawnFailed {
                program: program.clone(),
                source,
            })
    }
}

fn read_state(state: &Mutex<SessionState>) -> SessionState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    match state.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

async fn run_session<T, H>(
    program: String,
    mut child: Child,
    mut handler: H,
    controller: ActorController<T>,
    token: CancellationToken,
    state: Arc<Mutex<SessionState>>,
    options: StreamOptions,
) where
    T: Send + 'static,
    H: CommandHandler<T>,
{
    let mut stderr_task = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));

    let mut result = match child.stdout.take() {
        Some(stdout) => pump_stdout(stdout, &mut handler, &controller, &token, &options).await,
        None => Err(CommandError::StdoutNotAvailable),
    };
    if result.is_ok() {
        result = wait_for_exit(&program, &mut child, &token, &mut stderr_task, &options).await;
    }

    if let Some(task) = stderr_task.take() {
        task.abort();
    }

    if matches!(result, Err(CommandError::Cancelled)) {
        terminate(&mut child).await;
        set_state(&state, SessionState::Superseded);
        log::debug!("Session for {} superseded", program);
        return;
    }

    match &result {
        Ok(()) => {
            set_state(&state, SessionState::Completed);
            log::info!("Command {} completed", program);
        }
        Err(e) => {
            terminate(&mut child).await;
            set_state(&state, SessionState::Failed);
            log::warn!("Command {} failed: {}", program, e);
        }
    }

    if let Some(message) = handler.on_complete(&result) {
        if let Err(e) = controller.send_until_cancelled(message, &token).await {
            log::debug!("Dropped completion message: {}", e);
        }
    }
}

async fn pump_stdout<T, H, R>(
    stdout: R,
    handler: &mut H,
    controller: &ActorController<T>,
    token: &CancellationToken,
    options: &StreamOptions,
) -> Result<(), CommandError>
where
    T: Send + 'static,
    H: CommandHandler<T>,
    R: AsyncRead + Unpin,
{
    let batch_size = options.batch_size.max(1);
    let mut segments = BufReader::new(stdout).split(b'\n');
    let mut batch: Vec<H::Item> = Vec::with_capacity(batch_size);
    let flush = tokio::time::sleep(options.flush_interval);
    tokio::pin!(flush);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CommandError::Cancelled),
            _ = &mut flush, if !batch.is_empty() => {
                deliver(handler, controller, token, &mut batch).await?;
            }
            segment = segments.next_segment() => {
                match segment {
                    Ok(Some(bytes)) => {
                        let line = decode_line(bytes);
                        log::trace!("Command output line: {}", line);
                        if let Some(item) = handler.on_stdout(line) {
                            if batch.is_empty() {
                                flush.as_mut().reset(Instant::now() + options.flush_interval);
                            }
                            batch.push(item);
                            if batch.len() >= batch_size {
                                deliver(handler, controller, token, &mut batch).await?;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(CommandError::ReadFailed(e)),
                }
            }
        }
    }

    if !batch.is_empty() {
        deliver(handler, controller, token, &mut batch).await?;
    }
    Ok(())
}

async fn deliver<T, H>(
    handler: &mut H,
    controller: &ActorController<T>,
    token: &CancellationToken,
    batch: &mut Vec<H::Item>,
) -> Result<(), CommandError>
where
    T: Send + 'static,
    H: CommandHandler<T>,
{
    let items = std::mem::take(batch);
    log::trace!("Delivering batch of {} items", items.len());
    let message = handler.on_batch(items);
    controller
        .send_until_cancelled(message, token)
        .await
        .map_err(|e| match e {
            // Nobody is listening anymore; stop like a superseded session.
            ActorSendError::Cancelled | ActorSendError::ChannelClosed => CommandError::Cancelled,
        })
}

async fn wait_for_exit(
    program: &str,
    child: &mut Child,
    token: &CancellationToken,
    stderr_task: &mut Option<JoinHandle<Option<String>>>,
    options: &StreamOptions,
) -> Result<(), CommandError> {
    let status = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(CommandError::Cancelled),
        status = child.wait() => status.map_err(CommandError::WaitFailed)?,
    };
    log::debug!("Command completed with status: {}", status);

    let accepted = status
        .code()
        .map(|code| options.accepted_exit_codes.contains(&code))
        .unwrap_or(false);
    if accepted {
        return Ok(());
    }

    let stderr = match stderr_task.take() {
        Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
            Ok(Ok(last)) => last,
            _ => None,
        },
        None => None,
    };
    Err(CommandError::ExitStatus {
        program: program.to_string(),
        status,
        stderr,
    })
}

/// Log every stderr line and keep the last non-empty one.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R) -> Option<String> {
    let mut segments = BufReader::new(stderr).split(b'\n');
    let mut last = None;
    while let Ok(Some(bytes)) = segments.next_segment().await {
        let line = decode_line(bytes);
        if line.trim().is_empty() {
            continue;
        }
        log::warn!("Command stderr: {}", line);
        last = Some(line);
    }
    last
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log::debug!("Failed to kill child process: {}", e);
    }
    if let Err(e) = child.wait().await {
        log::warn!("Failed to reap child process: {}", e);
    }
}

fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
