use crate::constants::DEFAULT_REPLAY_TIMEOUT_SECS;
use crate::device::DeviceAddress;
use crate::error::DlError;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Captured outcome of one replay tool run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InjectionResult {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl InjectionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A fully resolved external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl fmt::Display for ReplayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Executes external commands and captures their output.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner {
    async fn run(&self, command: &ReplayCommand) -> Result<InjectionResult, DlError>;
}

/// Runs commands as tokio child processes.
///
/// On unix the child leads its own process group. When the timeout expires
/// the group gets SIGTERM (which `sudo` relays to the command it runs), then
/// SIGKILL once [`KILL_GRACE`] has passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

/// Time a timed-out child gets to exit after SIGTERM
pub const KILL_GRACE: Duration = Duration::from_millis(500);

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ReplayCommand) -> Result<InjectionResult, DlError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| DlError::ReplaySpawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        let waiting = child.wait_with_output();
        tokio::pin!(waiting);

        let output = match timeout(command.timeout, &mut waiting).await {
            Ok(result) => result.map_err(|source| DlError::ReplaySpawn {
                program: command.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!("Replay tool exceeded {:?}, terminating it", command.timeout);
                signal_group(pid, GroupSignal::Terminate);
                if timeout(KILL_GRACE, &mut waiting).await.is_err() {
                    warn!("Replay tool ignored SIGTERM, killing it");
                    signal_group(pid, GroupSignal::Kill);
                }
                return Err(DlError::ReplayTimeout {
                    program: command.program.clone(),
                    timeout: command.timeout,
                });
            }
        };

        let result = InjectionResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(exit_code = ?result.exit_code, "Replay tool exited");
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // ESRCH just means the group is already gone
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!("killpg({}, {:?}) failed: {}", pid, signal, e);
    }
}

// Dropping the child kills it through `kill_on_drop`.
#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: GroupSignal) {}

/// Launches the privileged replay tool against a device.
///
/// The tool itself refuses to run without root; no privilege check happens
/// here. When `elevate` is set (e.g. `["sudo", "-n"]`) the tool is run
/// through that wrapper command line.
#[derive(Debug, Clone)]
pub struct ReplayInvoker<R> {
    runner: R,
    elevate: Option<Vec<String>>,
    timeout: Duration,
}

impl<R: ProcessRunner> ReplayInvoker<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            elevate: None,
            timeout: Duration::from_secs(DEFAULT_REPLAY_TIMEOUT_SECS),
        }
    }

    pub fn with_elevate(mut self, elevate: Option<Vec<String>>) -> Self {
        self.elevate = elevate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Build `<binary> <vvvv:pppp> <packet_path>`, wrapped if elevation is configured.
    pub fn command(&self, address: &DeviceAddress, packet_path: &Path, binary: &Path) -> ReplayCommand {
        let mut args: Vec<OsString> = vec![address.to_string().into(), packet_path.as_os_str().to_owned()];
        let program = match self.elevate.as_deref() {
            Some([wrapper, wrapper_args @ ..]) => {
                let mut wrapped: Vec<OsString> = wrapper_args.iter().map(OsString::from).collect();
                wrapped.push(binary.as_os_str().to_owned());
                wrapped.append(&mut args);
                args = wrapped;
                PathBuf::from(wrapper)
            }
            _ => binary.to_path_buf(),
        };
        ReplayCommand {
            program,
            args,
            timeout: self.timeout,
        }
    }

    pub async fn invoke(
        &self,
        address: &DeviceAddress,
        packet_path: &Path,
        binary: &Path,
    ) -> Result<InjectionResult, DlError> {
        let command = self.command(address, packet_path, binary);
        info!("Running replay tool: {}", command);
        self.runner.run(&command).await
    }
}
