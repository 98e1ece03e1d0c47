use std::time::Duration;

use kodou::{Inlet, Pulse};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::config::Config;
use crate::process::{Child, KillError, Launcher, SpawnError};
use crate::types::{Event, ExitOutcome, Shutdown};

/// How long to wait for a killed child to be reaped.
const REAP_LIMIT: Duration = Duration::from_secs(5);
const EVENT_CAPACITY: usize = 256;

/// Heartbeat deadline bookkeeping for one Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
	period: Duration,
	deadline: Instant,
	missed: u32,
}

impl Liveness {
	/// A fresh Run gets two periods before its first heartbeat is due.
	pub fn new(period: Duration, now: Instant) -> Self {
		Self {
			period,
			deadline: now + period * 2,
			missed: 0,
		}
	}

	pub fn deadline(&self) -> Instant {
		self.deadline
	}

	pub fn missed(&self) -> u32 {
		self.missed
	}

	pub fn heartbeat(&mut self, now: Instant) {
		self.missed = 0;
		self.deadline = now + self.period;
	}

	/// Count a miss if the deadline has been reached. Returns whether one was.
	pub fn check(&mut self, now: Instant) -> bool {
		if self.deadline > now {
			return false;
		}
		self.missed += 1;
		self.deadline = now + self.period;
		true
	}
}

/// One supervised lifetime of a child, from spawn to confirmed exit.
#[derive(Debug)]
pub struct Run<C> {
	pub number: u32,
	pub child: C,
	pub liveness: Liveness,
}

enum Wake {
	Command(Option<Pulse>),
	Heartbeat(Option<Pulse>),
	Interrupt(Option<()>),
	Deadline,
}

/// The supervisor loop.
///
/// Owns both channels for its whole lifetime and at most one child at a time.
/// Everything runs on the calling task; the only places it waits are the
/// event select, the cooldown, and reaping a killed child.
pub struct Monitor<'a, L: Launcher> {
	config: &'a Config,
	launcher: L,
	heartbeats: Option<Inlet>,
	commands: Option<Inlet>,
	interrupts: Option<mpsc::Receiver<()>>,
	events: broadcast::Sender<Event>,
	runs: u32,
}

impl<'a, L: Launcher> Monitor<'a, L> {
	pub fn new(config: &'a Config, launcher: L, heartbeats: Inlet, commands: Inlet) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			config,
			launcher,
			heartbeats: Some(heartbeats),
			commands: Some(commands),
			interrupts: None,
			events,
			runs: 0,
		}
	}

	/// Operator interrupts. While a child runs they are forwarded to it;
	/// between runs one ends the monitor.
	pub fn with_interrupts(mut self, interrupts: mpsc::Receiver<()>) -> Self {
		self.interrupts = Some(interrupts);
		self
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	/// Number of children spawned so far.
	pub fn runs(&self) -> u32 {
		self.runs
	}

	/// Supervise until a child exits cleanly or the operator interrupts
	/// between runs. Fails only if the command cannot be launched.
	pub async fn run(&mut self) -> Result<Shutdown, SpawnError> {
		loop {
			let mut run = self.spawn()?;
			let outcome = self.supervise(&mut run).await;
			self.emit(Event::Ended {
				run: run.number,
				outcome,
			});

			if outcome.is_success() {
				tracing::info!("run {}: exited cleanly", run.number);
				return Ok(Shutdown::Completed { runs: self.runs });
			}

			tracing::warn!("run {}: {}", run.number, outcome);
			drop(run);

			if self.cool_down().await {
				return Ok(Shutdown::Interrupted { runs: self.runs });
			}
		}
	}

	fn spawn(&mut self) -> Result<Run<L::Child>, SpawnError> {
		self.discard_stale();

		let number = self.runs + 1;
		tracing::info!("run {}: starting {}", number, self.config.command.join(" "));
		let child = self.launcher.launch(&self.config.command)?;
		self.runs = number;

		let run = Run {
			number,
			liveness: Liveness::new(self.config.heartbeat_period, Instant::now()),
			child,
		};
		self.emit(Event::Spawned {
			run: number,
			pid: run.child.pid(),
		});
		Ok(run)
	}

	/// Pulses that arrived while no child was running belong to nobody.
	fn discard_stale(&mut self) {
		for (name, inlet) in [("heartbeat", &mut self.heartbeats), ("command", &mut self.commands)] {
			if let Some(inlet) = inlet {
				let stale = inlet.drain();
				if stale > 0 {
					tracing::debug!("discarded {} stale {} pulses", stale, name);
				}
			}
		}
	}

	async fn supervise(&mut self, run: &mut Run<L::Child>) -> ExitOutcome {
		loop {
			// Commands first: a pending kill order wins over a pending heartbeat.
			let wake = tokio::select! {
				biased;
				pulse = next_pulse(&mut self.commands) => Wake::Command(pulse),
				pulse = next_pulse(&mut self.heartbeats) => Wake::Heartbeat(pulse),
				signal = next_interrupt(&mut self.interrupts) => Wake::Interrupt(signal),
				_ = time::sleep_until(run.liveness.deadline()) => Wake::Deadline,
			};

			let verdict = match wake {
				Wake::Command(Some(_)) => {
					if let Some(commands) = self.commands.as_mut() {
						commands.drain();
					}
					tracing::info!("run {}: kill ordered", run.number);
					Some(ExitOutcome::KilledByOrder)
				}
				Wake::Heartbeat(Some(_)) => {
					let burst = match self.heartbeats.as_mut() {
						Some(heartbeats) => heartbeats.drain(),
						None => 0,
					};
					run.liveness.heartbeat(Instant::now());
					tracing::debug!("run {}: heartbeat (+{} queued)", run.number, burst);
					self.emit(Event::Heartbeat { run: run.number });
					None
				}
				Wake::Deadline => self.deadline_elapsed(run),
				Wake::Interrupt(Some(())) => {
					self.forward_interrupt(run);
					None
				}
				Wake::Command(None) => {
					tracing::warn!("command channel closed, kill orders will no longer be seen");
					self.commands = None;
					None
				}
				Wake::Heartbeat(None) => {
					tracing::warn!("heartbeat channel closed, only deadlines remain");
					self.heartbeats = None;
					None
				}
				Wake::Interrupt(None) => {
					self.interrupts = None;
					None
				}
			};

			if let Some(reason) = verdict {
				self.terminate(run, reason).await;
				return reason;
			}

			match run.child.try_wait() {
				Ok(Some(code)) => return ExitOutcome::Exited(code),
				Ok(None) => {}
				Err(e) => tracing::warn!("run {}: failed to poll child: {}", run.number, e),
			}
		}
	}

	fn deadline_elapsed(&mut self, run: &mut Run<L::Child>) -> Option<ExitOutcome> {
		if !run.liveness.check(Instant::now()) {
			return None;
		}

		let missed = run.liveness.missed();
		let allowed = self.config.allowed_misses;
		tracing::info!("run {}: missed heartbeat ({}/{})", run.number, missed, allowed);
		self.emit(Event::Missed {
			run: run.number,
			missed,
			allowed,
		});

		(missed >= allowed).then_some(ExitOutcome::MissedHeartbeats(missed))
	}

	fn forward_interrupt(&mut self, run: &mut Run<L::Child>) {
		tracing::info!("run {}: forwarding interrupt to child", run.number);
		self.emit(Event::Interrupted { run: run.number });
		if let Err(e) = run.child.interrupt() {
			tracing::warn!("run {}: could not interrupt child: {}", run.number, e);
		}
	}

	async fn terminate(&mut self, run: &mut Run<L::Child>, reason: ExitOutcome) {
		tracing::info!("run {}: killing child ({})", run.number, reason);
		self.emit(Event::Terminating {
			run: run.number,
			reason,
		});

		match run.child.kill() {
			Ok(()) => {}
			Err(KillError::AlreadyExited) => {
				tracing::info!("run {}: probably already dead", run.number);
			}
			Err(e) => {
				tracing::warn!("run {}: kill failed ({}), probably already dead", run.number, e);
			}
		}

		if let Some(code) = run.child.reap(REAP_LIMIT).await {
			tracing::debug!("run {}: reaped with status {}", run.number, code);
		}
	}

	/// Sleep out the cooldown. Returns true if the operator interrupted it.
	async fn cool_down(&mut self) -> bool {
		let delay = self.config.cooldown;
		self.emit(Event::CoolingDown { delay });

		let sleep = time::sleep(delay);
		tokio::pin!(sleep);

		loop {
			tokio::select! {
				_ = &mut sleep => return false,
				signal = next_interrupt(&mut self.interrupts) => match signal {
					Some(()) => {
						tracing::info!("interrupted with no child running");
						return true;
					}
					None => self.interrupts = None,
				},
			}
		}
	}

	fn emit(&self, event: Event) {
		let _ = self.events.send(event);
	}
}

async fn next_pulse(inlet: &mut Option<Inlet>) -> Option<Pulse> {
	match inlet {
		Some(inlet) => inlet.recv().await,
		None => std::future::pending().await,
	}
}

async fn next_interrupt(interrupts: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
	match interrupts {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}
