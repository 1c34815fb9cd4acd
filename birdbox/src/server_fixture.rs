//! Subprocess-backed BirdBox environments (`cli` and `local` modes).
//!
//! The server is spawned with its stdout/stderr redirected to a kept temp
//! file, polled on `/readyz` until it answers, and torn down with SIGTERM
//! first, SIGKILL if it lingers. Exactly one BirdBox is expected to be live
//! per suite; dropping a handle without calling [`BirdBox::stop`] still
//! kills the underlying process so no exit path leaks it.

use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::CliConfig;
use crate::container::ServerContainer;
use crate::error::{Error, Result};

/// Time a server process is given to exit after SIGTERM before SIGKILL
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling on the readiness poll
pub(crate) const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Env var overriding the `latticed` binary used in `local` mode
pub const SERVER_BINARY_ENV_VAR: &str = "LATTICE_SERVER_BINARY";

/// Configuration of a running environment, as seen by clients
#[derive(Debug, Clone)]
pub struct BirdBoxConfiguration {
    /// Base URL of the HTTP query API
    pub api_url: String,
}

/// A running server environment under test.
///
/// Owns the lifecycle of one server instance (process or container) for the
/// duration of a suite; tear it down with [`Self::stop`] once all
/// assertions are done.
#[derive(Debug)]
pub struct BirdBox {
    configuration: BirdBoxConfiguration,
    backend: Option<Backend>,
}

#[derive(Debug)]
pub(crate) enum Backend {
    Process(ServerProcess),
    Container(ServerContainer),
}

#[derive(Debug)]
pub(crate) struct ServerProcess {
    child: Child,
    log_path: Box<Path>,
}

impl BirdBox {
    pub(crate) fn new(configuration: BirdBoxConfiguration, backend: Backend) -> Self {
        Self {
            configuration,
            backend: Some(backend),
        }
    }

    pub fn configuration(&self) -> &BirdBoxConfiguration {
        &self.configuration
    }

    pub fn api_url(&self) -> &str {
        &self.configuration.api_url
    }

    /// Tear down whichever backend was started. Must be called exactly once,
    /// after all assertions in the suite complete.
    pub async fn stop(mut self) -> Result<()> {
        match self.backend.take() {
            Some(Backend::Process(mut process)) => {
                kill_politely(&mut process.child, GRACEFUL_STOP_TIMEOUT);
                dump_log_to_stdout("latticed", &process.log_path);
                Ok(())
            }
            Some(Backend::Container(container)) => container.stop().await,
            None => Ok(()),
        }
    }
}

impl Drop for BirdBox {
    fn drop(&mut self) {
        // Containers clean themselves up when their handle drops; a process
        // would outlive us.
        if let Some(Backend::Process(process)) = &mut self.backend {
            warn!("BirdBox dropped without stop(), killing server process");
            kill_politely(&mut process.child, GRACEFUL_STOP_TIMEOUT);
        }
    }
}

/// Start the server as a subprocess and wait until its API answers.
///
/// `cli` mode goes through the installed `lattice` CLI; `local` mode runs
/// the `latticed` server binary directly (override the binary with
/// `LATTICE_SERVER_BINARY`). The merged environment map is applied to the
/// child process as-is, plus a freshly picked API port.
pub async fn start_birdbox_from_cli(config: CliConfig) -> Result<BirdBox> {
    let port = pick_unused_port()?;
    let api_url = format!("http://127.0.0.1:{port}");

    // Keep the log file around to aid debugging
    let (log_file, log_path) = NamedTempFile::new()?.keep().map_err(|e| Error::Io(e.error))?;
    let stdout_log = log_file.try_clone()?;
    let stderr_log = log_file;

    let mut command = if config.use_server_binary() {
        let binary = std::env::var(SERVER_BINARY_ENV_VAR).unwrap_or_else(|_| "latticed".to_string());
        Command::new(binary)
    } else {
        let mut command = Command::new("lattice");
        command.arg("server");
        command
    };
    command
        .arg("--config")
        .arg(config.config_path())
        .arg("--db-type")
        .arg(config.db_type())
        .env("LATTICE_API_PORT", port.to_string())
        .envs(config.env())
        .stdout(stdout_log)
        .stderr(stderr_log);

    info!("server logging to {log_path:?}");
    log_command(&command);

    let child = command.spawn().map_err(|source| Error::Spawn {
        command: format!("{:?}", command.get_program()),
        source,
    })?;

    let mut process = ServerProcess {
        child,
        log_path: log_path.into_boxed_path(),
    };

    if let Err(e) = wait_until_ready(&mut process, &api_url).await {
        dump_log_to_stdout("latticed", &process.log_path);
        kill_politely(&mut process.child, GRACEFUL_STOP_TIMEOUT);
        return Err(e);
    }

    Ok(BirdBox::new(
        BirdBoxConfiguration { api_url },
        Backend::Process(process),
    ))
}

/// Poll `/readyz` until the server answers, bailing out early if the
/// process dies
async fn wait_until_ready(process: &mut ServerProcess, api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{api_url}/readyz");
    let start = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        if let Some(status) = process.child.try_wait()? {
            return Err(Error::EarlyExit { status });
        }

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(%url, "server is ready");
                return Ok(());
            }
            Ok(response) => {
                info!(status = %response.status(), "server not ready yet");
            }
            Err(e) => {
                info!("waiting for server: {e}");
            }
        }

        if start.elapsed() > READY_TIMEOUT {
            return Err(Error::ReadyTimeout {
                url: api_url.to_string(),
                timeout: READY_TIMEOUT,
            });
        }
        interval.tick().await;
    }
}

/// Poll an already-mapped API URL until it answers on `/readyz`
pub(crate) async fn wait_http_ready(api_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{api_url}/readyz");
    let start = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        if start.elapsed() > timeout {
            return Err(Error::ReadyTimeout {
                url: api_url.to_string(),
                timeout,
            });
        }
        interval.tick().await;
    }
}

fn pick_unused_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Log the command being run in a way that's convenient to copy-paste
fn log_command(command: &Command) {
    let envs: Vec<String> = command
        .get_envs()
        .map(|(key, value)| {
            format!(
                "{}={}",
                key.to_string_lossy(),
                value.unwrap_or_default().to_string_lossy()
            )
        })
        .collect();

    info!("running command: `{} {:?}`", envs.join(" "), command);
}

/// Dump the server log file to stdout
fn dump_log_to_stdout(label: &str, log_path: &Path) {
    match std::fs::read_to_string(log_path) {
        Ok(contents) => {
            info!("---- start {label} output ----");
            print!("{contents}");
            info!("---- end {label} output ----");
        }
        Err(e) => warn!("cannot read log file {log_path:?}: {e}"),
    }
}

/// Ask the child to exit with SIGTERM; SIGKILL it if it is still around
/// after `wait`
fn kill_politely(child: &mut Child, wait: Duration) {
    use nix::sys::signal::{self, Signal};
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;

    let Ok(raw_pid) = i32::try_from(child.id()) else {
        return;
    };
    let pid = Pid::from_raw(raw_pid);

    let exited = match signal::kill(pid, Signal::SIGTERM) {
        Ok(()) => wait_with_timeout(pid, wait).is_ok(),
        Err(e) => {
            info!("error sending SIGTERM to server process: {e}");
            false
        }
    };
    if exited {
        info!("server process terminated cleanly");
        return;
    }

    warn!("server process did not stop after SIGTERM, sending SIGKILL");
    if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
        info!("error sending SIGKILL to server process: {e}");
    }
    if let Err(e) = waitpid(pid, None) {
        info!("cannot wait for server process: {e}");
    }
}

/// Wait for the given PID to exit, with a timeout. `waitpid` has no native
/// timeout, so park it on a throwaway thread and bound the channel receive.
fn wait_with_timeout(pid: nix::unistd::Pid, timeout: Duration) -> Result<(), ()> {
    use nix::sys::wait::waitpid;

    let (sender, receiver) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        // errors if the receiver side is gone, which is fine
        sender.send(waitpid(pid, None).map(|_| ())).ok();
    });

    match receiver.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            info!("cannot wait for server process: {e}");
            Err(())
        }
        Err(_) => Err(()),
    }
}
