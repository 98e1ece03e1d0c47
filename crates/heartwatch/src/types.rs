use std::fmt;
use std::time::Duration;

/// How a Run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
	/// The child exited on its own. A child killed by a signal reports the
	/// negated signal number.
	Exited(i32),
	/// An operator sent a termination request.
	KilledByOrder,
	/// The child missed this many consecutive heartbeat deadlines.
	MissedHeartbeats(u32),
}

impl ExitOutcome {
	/// Only a clean exit ends supervision.
	pub fn is_success(&self) -> bool {
		matches!(self, ExitOutcome::Exited(0))
	}
}

impl fmt::Display for ExitOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitOutcome::Exited(code) => write!(f, "exit code {}", code),
			ExitOutcome::KilledByOrder => write!(f, "killed by order"),
			ExitOutcome::MissedHeartbeats(n) => write!(f, "missed {} heartbeats", n),
		}
	}
}

/// Status changes broadcast by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Spawned { run: u32, pid: Option<u32> },
	Heartbeat { run: u32 },
	Missed { run: u32, missed: u32, allowed: u32 },
	Interrupted { run: u32 },
	Terminating { run: u32, reason: ExitOutcome },
	Ended { run: u32, outcome: ExitOutcome },
	CoolingDown { delay: Duration },
}

/// How [`Monitor::run`](crate::Monitor::run) finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	/// A child exited with status 0.
	Completed { runs: u32 },
	/// The operator interrupted the supervisor while no child was alive.
	Interrupted { runs: u32 },
}

impl Shutdown {
	pub fn runs(&self) -> u32 {
		match self {
			Shutdown::Completed { runs } | Shutdown::Interrupted { runs } => *runs,
		}
	}
}
