use std::process::ExitCode;

use clap::Parser;
use kodou::Endpoint;
use owo_colors::OwoColorize;

/// Order a running heartwatch to kill its worker. The worker is restarted.
#[derive(Debug, Parser)]
#[command(name = "heartwatch-kill", version)]
struct Cli {
	/// Command endpoint of the supervisor
	#[arg(long, value_name = "ADDR", default_value = heartwatch::config::DEFAULT_COMMAND_ADDRESS)]
	control: Endpoint,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	match kodou::push_once(&cli.control).await {
		Ok(()) => {
			eprintln!("kill order sent to {}", cli.control);
			ExitCode::SUCCESS
		}
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}
