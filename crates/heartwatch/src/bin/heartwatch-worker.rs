use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use heartwatch::config::{parse_duration, DEFAULT_HEARTBEAT_ADDRESS};
use kodou::{Endpoint, Outlet};

/// Demo worker: works in fixed slices and pushes a heartbeat after each one.
#[derive(Debug, Parser)]
#[command(name = "heartwatch-worker", version)]
struct Cli {
	/// Heartbeat endpoint of the supervisor
	#[arg(long, value_name = "ADDR", default_value = DEFAULT_HEARTBEAT_ADDRESS)]
	heartbeat: Endpoint,

	/// Length of one slice of work
	#[arg(long, value_name = "DUR", default_value = "500ms", value_parser = parse_duration)]
	interval: Duration,

	/// Stop after this many slices [default: run forever]
	#[arg(long, value_name = "N")]
	beats: Option<u64>,

	/// Exit status once the last slice is done
	#[arg(long, value_name = "CODE", default_value_t = 0)]
	exit_code: u8,

	/// Do the work but never send a heartbeat
	#[arg(long)]
	silent: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	let mut outlet = Outlet::new(cli.heartbeat.clone());
	let mut done: u64 = 0;

	loop {
		if cli.beats.is_some_and(|limit| done >= limit) {
			eprintln!("[worker] enough work, exiting with {}", cli.exit_code);
			return ExitCode::from(cli.exit_code);
		}

		tokio::time::sleep(cli.interval).await;
		done += 1;

		if !cli.silent {
			if let Err(e) = outlet.push().await {
				eprintln!("[worker] heartbeat not delivered: {}", e);
			}
		}
	}
}
