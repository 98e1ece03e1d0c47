use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

/// A supervised child process.
///
/// Apart from [`reap`](Child::reap), nothing here may block.
#[allow(async_fn_in_trait)]
pub trait Child {
	fn pid(&self) -> Option<u32>;

	/// Exit code if the child has exited, without waiting.
	fn try_wait(&mut self) -> io::Result<Option<i32>>;

	/// Forcefully terminate the child.
	fn kill(&mut self) -> Result<(), KillError>;

	/// Deliver an interrupt (SIGINT) to the child.
	fn interrupt(&mut self) -> Result<(), KillError>;

	/// Wait at most `limit` for the child to exit and collect its code.
	async fn reap(&mut self, limit: Duration) -> Option<i32>;
}

/// Starts children from a command line.
pub trait Launcher {
	type Child: Child;

	fn launch(&mut self, command: &[String]) -> Result<Self::Child, SpawnError>;
}

/// Launches real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
	type Child = ProcessHandle;

	fn launch(&mut self, command: &[String]) -> Result<ProcessHandle, SpawnError> {
		ProcessHandle::start(command)
	}
}

/// An OS child process running in its own process group.
///
/// Signals go to the whole group, so helpers the child started are killed
/// with it. Terminal interrupts do not reach the group directly; the
/// supervisor forwards them with [`Child::interrupt`]. An ignored SIGINT is
/// inherited across exec, so callers must not launch with SIGINT ignored.
#[derive(Debug)]
pub struct ProcessHandle {
	child: tokio::process::Child,
	pid: Option<u32>,
	status: Option<i32>,
}

impl ProcessHandle {
	/// Spawn `command[0]` with the remaining elements as arguments. No shell
	/// is involved. Stdin is detached, stdout and stderr are inherited.
	pub fn start(command: &[String]) -> Result<Self, SpawnError> {
		let (program, args) = command.split_first().ok_or_else(|| SpawnError {
			program: String::new(),
			source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
		})?;

		let mut cmd = Command::new(program);
		cmd.args(args)
			.stdin(Stdio::null())
			.process_group(0)
			.kill_on_drop(true);

		let child = cmd.spawn().map_err(|source| SpawnError {
			program: program.clone(),
			source,
		})?;
		let pid = child.id();

		Ok(Self {
			child,
			pid,
			status: None,
		})
	}

	fn signal_group(&mut self, signal: Signal) -> Result<(), KillError> {
		if self.status.is_some() {
			return Err(KillError::AlreadyExited);
		}
		let pid = self.pid.ok_or(KillError::AlreadyExited)?;

		match killpg(Pid::from_raw(pid as i32), signal) {
			Ok(()) => Ok(()),
			Err(Errno::ESRCH) => Err(KillError::AlreadyExited),
			Err(errno) => Err(KillError::Signal { signal, errno }),
		}
	}
}

impl Child for ProcessHandle {
	fn pid(&self) -> Option<u32> {
		self.pid
	}

	fn try_wait(&mut self) -> io::Result<Option<i32>> {
		if self.status.is_some() {
			return Ok(self.status);
		}
		let code = self.child.try_wait()?.map(exit_code);
		self.status = code;
		Ok(code)
	}

	fn kill(&mut self) -> Result<(), KillError> {
		self.signal_group(Signal::SIGKILL)
	}

	fn interrupt(&mut self) -> Result<(), KillError> {
		self.signal_group(Signal::SIGINT)
	}

	async fn reap(&mut self, limit: Duration) -> Option<i32> {
		if self.status.is_some() {
			return self.status;
		}

		match tokio::time::timeout(limit, self.child.wait()).await {
			Ok(Ok(status)) => {
				let code = exit_code(status);
				self.status = Some(code);
				Some(code)
			}
			Ok(Err(e)) => {
				tracing::warn!("failed to reap pid {:?}: {}", self.pid, e);
				None
			}
			Err(_) => {
				tracing::warn!("pid {:?} still running {:?} after kill", self.pid, limit);
				None
			}
		}
	}
}

/// The exit code, or the negated signal number for a child killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
	status
		.code()
		.unwrap_or_else(|| status.signal().map(|s| -s).unwrap_or(-1))
}

// ── errors ──────────────────────────────────────────────────────────────────

/// The child could not be launched.
#[derive(Debug)]
pub struct SpawnError {
	pub program: String,
	pub source: io::Error,
}

impl std::fmt::Display for SpawnError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "failed to spawn {}: {}", self.program, self.source)
	}
}

impl std::error::Error for SpawnError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.source)
	}
}

/// A signal could not be delivered to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillError {
	/// The child is gone already.
	AlreadyExited,
	Signal { signal: Signal, errno: Errno },
}

impl std::fmt::Display for KillError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			KillError::AlreadyExited => write!(f, "process already exited"),
			KillError::Signal { signal, errno } => write!(f, "failed to send {:?}: {}", signal, errno),
		}
	}
}

impl std::error::Error for KillError {}
