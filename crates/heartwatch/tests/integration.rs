use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use heartwatch::{Child, Config, Event, ExitOutcome, KillError, Monitor, ProcessHandle, ProcessLauncher, Shutdown};
use kodou::{Endpoint, Inlet};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

const WORKER: &str = env!("CARGO_BIN_EXE_heartwatch-worker");

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> std::path::PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("heartwatch-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::create_dir_all(&dir);
	dir
}

fn cmd(args: &[&str]) -> Vec<String> {
	args.iter().map(|s| s.to_string()).collect()
}

/// Config with fast timings and channels inside `dir`, running the demo worker.
fn worker_config(dir: &std::path::Path, worker_args: &[&str]) -> Config {
	let heartbeat = Endpoint::ipc(dir.join("hb.sock"));
	let mut command = vec![WORKER.to_string(), "--heartbeat".into(), heartbeat.to_string()];
	command.extend(worker_args.iter().map(|s| s.to_string()));

	let mut config = Config::new(command);
	config.heartbeat_address = heartbeat;
	config.command_address = Endpoint::ipc(dir.join("cmd.sock"));
	config.heartbeat_period = Duration::from_millis(200);
	config.allowed_misses = 2;
	config.cooldown = Duration::from_millis(100);
	config
}

async fn bind(config: &Config) -> (Inlet, Inlet) {
	let heartbeats = Inlet::bind(&config.heartbeat_address).await.unwrap();
	let commands = Inlet::bind(&config.command_address).await.unwrap();
	(heartbeats, commands)
}

async fn wait_for(events: &mut broadcast::Receiver<Event>, hit: impl Fn(&Event) -> bool) -> Vec<Event> {
	let mut seen = Vec::new();
	loop {
		match events.recv().await {
			Ok(event) => {
				let done = hit(&event);
				seen.push(event);
				if done {
					return seen;
				}
			}
			Err(RecvError::Lagged(_)) => continue,
			Err(RecvError::Closed) => return seen,
		}
	}
}

// --- Process handle ---

#[tokio::test]
async fn missing_executable_is_spawn_error() {
	let err = ProcessHandle::start(&cmd(&["/nonexistent/heartwatch-no-such-binary"])).unwrap_err();
	assert_eq!(err.program, "/nonexistent/heartwatch-no-such-binary");
	assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
	assert!(err.to_string().contains("failed to spawn"));
}

#[tokio::test]
async fn exit_code_is_reported() {
	let mut child = ProcessHandle::start(&cmd(&["sh", "-c", "exit 17"])).unwrap();
	assert!(child.pid().is_some());
	assert_eq!(child.reap(Duration::from_secs(5)).await, Some(17));
	assert_eq!(child.try_wait().unwrap(), Some(17));
}

#[tokio::test]
async fn try_wait_does_not_block() {
	let mut child = ProcessHandle::start(&cmd(&["sleep", "30"])).unwrap();

	let polled = timeout(Duration::from_millis(100), async { child.try_wait() }).await;
	assert!(matches!(polled, Ok(Ok(None))));

	child.kill().unwrap();
	assert_eq!(child.reap(Duration::from_secs(5)).await, Some(-9));
}

#[tokio::test]
async fn kill_twice_is_harmless() {
	let mut child = ProcessHandle::start(&cmd(&["sleep", "30"])).unwrap();

	assert!(child.kill().is_ok());
	assert_eq!(child.reap(Duration::from_secs(5)).await, Some(-9));

	assert_eq!(child.kill(), Err(KillError::AlreadyExited));
	assert_eq!(child.kill(), Err(KillError::AlreadyExited));
	assert_eq!(child.interrupt(), Err(KillError::AlreadyExited));
}

#[tokio::test]
async fn kill_takes_down_process_group() {
	// The shell waits on a background sleep; killing only the shell would hang.
	let mut child = ProcessHandle::start(&cmd(&["sh", "-c", "sleep 30 & wait"])).unwrap();
	tokio::time::sleep(Duration::from_millis(100)).await;

	child.kill().unwrap();
	assert_eq!(child.reap(Duration::from_secs(5)).await, Some(-9));
}

#[tokio::test]
async fn interrupt_reaches_child() {
	let mut child = ProcessHandle::start(&cmd(&["sleep", "30"])).unwrap();
	tokio::time::sleep(Duration::from_millis(50)).await;

	child.interrupt().unwrap();
	assert_eq!(child.reap(Duration::from_secs(5)).await, Some(-2));
}

// --- End to end with the demo worker ---

#[tokio::test]
async fn worker_finishing_cleanly_ends_supervision() {
	let dir = temp_dir("clean");
	let config = worker_config(&dir, &["--interval", "50ms", "--beats", "10"]);
	let (heartbeats, commands) = bind(&config).await;

	let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
	let mut events = monitor.subscribe();

	let shutdown = timeout(Duration::from_secs(10), monitor.run()).await.unwrap().unwrap();
	assert_eq!(shutdown, Shutdown::Completed { runs: 1 });

	let seen = wait_for(&mut events, |e| matches!(e, Event::Ended { .. })).await;
	assert!(seen.iter().any(|e| matches!(e, Event::Heartbeat { run: 1 })));
	assert!(!seen.iter().any(|e| matches!(e, Event::Terminating { .. })));

	drop(monitor);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn silent_worker_is_restarted() {
	let dir = temp_dir("silent");
	let config = worker_config(&dir, &["--silent", "--interval", "50ms"]);
	let (heartbeats, commands) = bind(&config).await;

	let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
	let mut events = monitor.subscribe();

	let seen = tokio::select! {
		result = monitor.run() => panic!("monitor stopped: {:?}", result),
		seen = timeout(
			Duration::from_secs(10),
			wait_for(&mut events, |e| matches!(e, Event::Spawned { run: 2, .. })),
		) => seen.unwrap(),
	};

	assert!(seen.contains(&Event::Terminating {
		run: 1,
		reason: ExitOutcome::MissedHeartbeats(2)
	}));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn kill_order_restarts_worker() {
	let dir = temp_dir("order");
	let mut config = worker_config(&dir, &["--interval", "50ms"]);
	config.heartbeat_period = Duration::from_secs(2);
	let (heartbeats, commands) = bind(&config).await;
	let control = config.command_address.clone();

	let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
	let mut events = monitor.subscribe();

	let order = async {
		wait_for(&mut events, |e| matches!(e, Event::Heartbeat { run: 1 })).await;
		kodou::push_once(&control).await.unwrap();
		wait_for(&mut events, |e| matches!(e, Event::Spawned { run: 2, .. })).await
	};

	let seen = tokio::select! {
		result = monitor.run() => panic!("monitor stopped: {:?}", result),
		seen = timeout(Duration::from_secs(10), order) => seen.unwrap(),
	};

	assert!(seen.contains(&Event::Terminating {
		run: 1,
		reason: ExitOutcome::KilledByOrder
	}));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn failing_worker_reports_exit_code() {
	let dir = temp_dir("failing");
	let config = worker_config(&dir, &["--interval", "20ms", "--beats", "1", "--exit-code", "17"]);
	let (heartbeats, commands) = bind(&config).await;

	let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
	let mut events = monitor.subscribe();

	let seen = tokio::select! {
		result = monitor.run() => panic!("monitor stopped: {:?}", result),
		seen = timeout(
			Duration::from_secs(10),
			wait_for(&mut events, |e| matches!(e, Event::Spawned { run: 2, .. })),
		) => seen.unwrap(),
	};

	assert!(seen.contains(&Event::Ended {
		run: 1,
		outcome: ExitOutcome::Exited(17)
	}));
	assert!(!seen.iter().any(|e| matches!(e, Event::Terminating { .. })));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unlaunchable_command_stops_monitor() {
	let dir = temp_dir("unlaunchable");
	let mut config = worker_config(&dir, &[]);
	config.command = cmd(&["/nonexistent/heartwatch-no-such-binary"]);
	let (heartbeats, commands) = bind(&config).await;

	let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
	assert!(monitor.run().await.is_err());

	let _ = std::fs::remove_dir_all(&dir);
}
