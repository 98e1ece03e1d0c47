mod status;

use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use heartwatch::config::{self, Config, Overrides};
use heartwatch::{Monitor, ProcessLauncher, Shutdown};
use kodou::Inlet;
use owo_colors::OwoColorize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(
	name = "heartwatch",
	version,
	about = "Keep a worker alive: restart it when its heartbeat stops, when it fails, or on order"
)]
struct Cli {
	/// Config file [default: ~/.config/heartwatch/config.toml if present]
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Endpoint the worker pushes heartbeats to [default: ipc://heartbeat]
	#[arg(long, value_name = "ADDR")]
	heartbeat: Option<String>,

	/// Endpoint that accepts kill orders [default: ipc://command]
	#[arg(long, value_name = "ADDR")]
	control: Option<String>,

	/// Expected time between heartbeats, e.g. 1s or 500ms [default: 1s]
	#[arg(long, value_name = "DUR", value_parser = config::parse_duration)]
	period: Option<Duration>,

	/// Consecutive missed heartbeats tolerated before a restart [default: 2]
	#[arg(long, value_name = "N")]
	misses: Option<u32>,

	/// Pause before relaunching a failed worker [default: 1s]
	#[arg(long, value_name = "DUR", value_parser = config::parse_duration)]
	cooldown: Option<Duration>,

	/// More log output (-v info, -vv debug, -vvv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,

	/// Command to supervise, followed by its arguments
	#[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
	command: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	let file = match config::load(cli.config.as_deref()) {
		Ok(f) => f,
		Err(e) => return fail(e),
	};
	let overrides = Overrides {
		command: cli.command,
		heartbeat_address: cli.heartbeat,
		command_address: cli.control,
		heartbeat_period: cli.period,
		allowed_misses: cli.misses,
		cooldown: cli.cooldown,
	};
	let config = match Config::resolve(file, overrides) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("usage: heartwatch [options] <command> [args...]");
			return fail(e);
		}
	};

	let heartbeats = match Inlet::bind(&config.heartbeat_address).await {
		Ok(i) => i,
		Err(e) => {
			tracing::error!("heartbeat channel unavailable: {}", e);
			return fail(e);
		}
	};
	let commands = match Inlet::bind(&config.command_address).await {
		Ok(i) => i,
		Err(e) => {
			tracing::error!("command channel unavailable: {}", e);
			return fail(e);
		}
	};
	let interrupts = match forward_interrupts() {
		Ok(rx) => rx,
		Err(e) => return fail(format!("failed to install interrupt handler: {}", e)),
	};

	tracing::info!(
		"heartbeats on {}, kill orders on {}",
		config.heartbeat_address,
		config.command_address
	);

	let mut monitor =
		Monitor::new(&config, ProcessLauncher, heartbeats, commands).with_interrupts(interrupts);
	let printer = tokio::spawn(status::print_events(monitor.subscribe()));

	let result = monitor.run().await;
	drop(monitor);
	let _ = printer.await;

	match result {
		Ok(Shutdown::Completed { runs }) => {
			eprintln!("{} exiting with return code 0 ({} runs)", status::TAG.cyan(), runs);
			ExitCode::SUCCESS
		}
		Ok(Shutdown::Interrupted { runs }) => {
			eprintln!("{} interrupted after {} runs", status::TAG.cyan(), runs);
			ExitCode::from(130)
		}
		Err(e) => fail(e),
	}
}

/// Route SIGINT into the monitor instead of letting it end the process.
fn forward_interrupts() -> std::io::Result<mpsc::Receiver<()>> {
	let mut sigint = signal(SignalKind::interrupt())?;
	let (tx, rx) = mpsc::channel(8);
	tokio::spawn(async move {
		while sigint.recv().await.is_some() {
			if tx.send(()).await.is_err() {
				break;
			}
		}
	});
	Ok(rx)
}

fn init_tracing(verbose: u8) {
	let level = match verbose {
		0 => tracing::Level::WARN,
		1 => tracing::Level::INFO,
		2 => tracing::Level::DEBUG,
		_ => tracing::Level::TRACE,
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

fn fail(e: impl Display) -> ExitCode {
	eprintln!("{} {}", "error:".red().bold(), e);
	ExitCode::FAILURE
}
