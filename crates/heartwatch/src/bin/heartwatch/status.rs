use heartwatch::Event;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::{self, error::RecvError};

pub const TAG: &str = "[heartwatch]";

pub async fn print_events(mut events: broadcast::Receiver<Event>) {
	loop {
		match events.recv().await {
			Ok(event) => eprintln!("{} {}", TAG.cyan(), render(&event)),
			Err(RecvError::Lagged(n)) => {
				eprintln!("{} {}", TAG.cyan(), format!("({} status lines skipped)", n).dimmed())
			}
			Err(RecvError::Closed) => break,
		}
	}
}

pub fn render(event: &Event) -> String {
	match event {
		Event::Spawned { run, pid } => {
			let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
			format!("{} run {} (pid {})", "started".bold(), run, pid)
		}
		Event::Heartbeat { .. } => format!("{}", "got heartbeat".dimmed()),
		Event::Missed { missed, allowed, .. } => {
			format!("{}", format!("missing a heartbeat ({}/{})", missed, allowed).yellow())
		}
		Event::Interrupted { run } => format!("interrupt forwarded to run {}", run),
		Event::Terminating { reason, .. } => {
			format!("{} {}", "killing off the process:".red(), reason)
		}
		Event::Ended { run, outcome } if outcome.is_success() => {
			format!("{}", format!("run {} exited cleanly", run).green())
		}
		Event::Ended { run, outcome } => {
			format!("{} {}", format!("run {} failed:", run).red().bold(), outcome)
		}
		Event::CoolingDown { delay } => format!("restarting in {:?}", delay),
	}
}
