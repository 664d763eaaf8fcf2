//! Lifecycle of the long-lived speech worker process.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::protocol::{read_frame, write_frame, WorkerFrame, WorkerRequest};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to the speech worker, starting it on first use.
///
/// Each inference call opens its own connection; closing that connection
/// tells the worker to abandon whatever sequence it was producing.
pub struct WorkerBridge {
    socket_path: PathBuf,
    command: String,
    start_timeout: Duration,
    read_timeout: Duration,
    load_timeout: Duration,
    process: Mutex<Option<Child>>,
}

impl WorkerBridge {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        command: impl Into<String>,
        start_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            command: command.into(),
            start_timeout,
            read_timeout,
            load_timeout: read_timeout,
            process: Mutex::new(None),
        }
    }

    /// Read timeout for `load` replies, which wait on model construction.
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            &config.worker_socket,
            &config.worker_command,
            config.worker_start_timeout(),
            config.engine_pull_timeout(),
        )
        .with_load_timeout(config.model_load_timeout())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start the worker if it does not answer a `check` round trip.
    ///
    /// Callers are serialized on the process slot, so concurrent first
    /// requests share a single child.
    pub fn ensure_running(&self) -> Result<()> {
        let mut process = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        if self.check().is_ok() {
            debug!("Speech worker already running");
            return Ok(());
        }

        if let Some(mut stale) = process.take() {
            warn!("Speech worker (pid {}) stopped answering, restarting", stale.id());
            let _ = stale.kill();
            let _ = stale.wait();
        }

        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Bridge("Worker command is empty".to_string()))?;

        info!("Starting speech worker: {}", self.command);
        let child = Command::new(program)
            .args(parts)
            .arg("--socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Bridge(format!("Failed to start speech worker: {}", e)))?;
        *process = Some(child);

        let deadline = Instant::now() + self.start_timeout;
        while Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
            if self.check().is_ok() {
                info!("Speech worker ready on {}", self.socket_path.display());
                return Ok(());
            }
            if let Some(status) = process.as_mut().and_then(|c| c.try_wait().ok().flatten()) {
                *process = None;
                return Err(Error::Bridge(format!("Speech worker exited during startup: {}", status)));
            }
        }

        if let Some(mut child) = process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        Err(Error::Bridge(format!(
            "Speech worker failed to start within {:?}",
            self.start_timeout
        )))
    }

    /// One `check` round trip against an already running worker.
    pub fn check(&self) -> Result<()> {
        match self.call_once(&WorkerRequest::command("check"))? {
            WorkerFrame::Status { status, device, .. } if status == "ok" => {
                if let Some(device) = device {
                    debug!("Speech worker reports device {}", device);
                }
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Send a request that expects exactly one reply frame.
    pub fn call(&self, request: &WorkerRequest) -> Result<WorkerFrame> {
        let mut stream = self.connect_or_start(self.read_timeout)?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    /// Like [`call`](Self::call), but waits up to the load timeout for the reply.
    pub fn call_load(&self, request: &WorkerRequest) -> Result<WorkerFrame> {
        let mut stream = self.connect_or_start(self.load_timeout)?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    /// Send a request and hand back the connection for the caller to read frames from.
    pub fn open(&self, request: &WorkerRequest) -> Result<UnixStream> {
        let mut stream = self.connect_or_start(self.read_timeout)?;
        write_frame(&mut stream, request)?;
        Ok(stream)
    }

    /// Ask the worker to exit, then reap it if this process started it.
    pub fn stop(&self) {
        if let Ok(mut stream) = self.connect() {
            if let Err(e) = write_frame(&mut stream, &WorkerRequest::command("shutdown")) {
                debug!("Shutdown request not delivered: {}", e);
            }
        }

        if let Some(mut child) = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            info!("Stopping speech worker (pid {})", child.id());
            if let Err(e) = child.kill() {
                debug!("Speech worker already exited: {}", e);
            }
            let _ = child.wait();
        }

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove worker socket: {}", e);
            }
        }
    }

    fn call_once(&self, request: &WorkerRequest) -> Result<WorkerFrame> {
        let mut stream = self.connect()?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    /// Connect to a listening worker, starting one only when nothing answers.
    fn connect_or_start(&self, read_timeout: Duration) -> Result<UnixStream> {
        if let Ok(stream) = self.connect_with(read_timeout) {
            return Ok(stream);
        }
        self.ensure_running()?;
        self.connect_with(read_timeout)
    }

    fn connect(&self) -> Result<UnixStream> {
        self.connect_with(self.read_timeout)
    }

    fn connect_with(&self, read_timeout: Duration) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| Error::Bridge(format!("Failed to connect to speech worker: {}", e)))?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(stream)
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        if let Some(mut child) = self
            .process
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Error for a frame that does not answer the request that was sent.
pub(crate) fn unexpected(frame: WorkerFrame) -> Error {
    match frame {
        WorkerFrame::Error { message } => Error::Bridge(message),
        WorkerFrame::Status {
            error: Some(error), ..
        } => Error::Bridge(error),
        other => Error::Bridge(format!("Unexpected worker reply: {:?}", other)),
    }
}
