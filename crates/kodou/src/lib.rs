//! # kodou
//!
//! Many-to-one pulse channels for liveness signalling.
//!
//! A process binds an [`Inlet`] on an [`Endpoint`]; any number of other
//! processes connect an [`Outlet`] to it and push pulses. A pulse carries no
//! data, only the fact that it arrived.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kodou::{Endpoint, Inlet, Outlet};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), kodou::ChannelError> {
//! let endpoint: Endpoint = "ipc:///tmp/myapp.heartbeat".parse()?;
//! let mut inlet = Inlet::bind(&endpoint).await?;
//!
//! let mut outlet = Outlet::new(endpoint);
//! outlet.push().await?;
//!
//! assert!(inlet.recv().await.is_some());
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod error;
pub mod inlet;
pub mod outlet;

pub use endpoint::Endpoint;
pub use error::ChannelError;
pub use inlet::{Inlet, Pulse};
pub use outlet::{push_once, Outlet};
