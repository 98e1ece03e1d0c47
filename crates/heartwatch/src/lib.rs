//! # heartwatch
//!
//! Heartbeat process supervisor.
//!
//! Launches a worker, listens for the heartbeats it pushes over a
//! [`kodou`] channel, and kills and relaunches it when it goes quiet, exits
//! with a failure, or an operator orders it. A clean exit (status 0) ends
//! supervision.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use heartwatch::{Config, Monitor, ProcessLauncher};
//! use kodou::Inlet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new(vec!["./worker".into()]);
//! let heartbeats = Inlet::bind(&config.heartbeat_address).await?;
//! let commands = Inlet::bind(&config.command_address).await?;
//!
//! let mut monitor = Monitor::new(&config, ProcessLauncher, heartbeats, commands);
//! let shutdown = monitor.run().await?;
//! println!("done after {} runs", shutdown.runs());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod monitor;
pub mod process;
pub mod types;

pub use config::{Config, ConfigError};
pub use monitor::{Liveness, Monitor, Run};
pub use process::{Child, KillError, Launcher, ProcessHandle, ProcessLauncher, SpawnError};
pub use types::*;
