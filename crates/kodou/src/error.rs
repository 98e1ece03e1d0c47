use std::io;

use crate::endpoint::Endpoint;

/// Errors from the pulse transport.
#[derive(Debug)]
pub enum ChannelError {
	/// The address string is not a recognised endpoint.
	Address(String),
	/// Binding the endpoint failed.
	Bind { endpoint: Endpoint, source: io::Error },
	/// Connecting to the endpoint failed (nobody bound there).
	Connect { endpoint: Endpoint, source: io::Error },
	/// IO error on an established connection.
	Io(io::Error),
	/// The receiving side is gone.
	Closed,
}

impl std::fmt::Display for ChannelError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ChannelError::Address(raw) => write!(f, "invalid endpoint: {}", raw),
			ChannelError::Bind { endpoint, source } => {
				write!(f, "failed to bind {}: {}", endpoint, source)
			}
			ChannelError::Connect { endpoint, source } => {
				write!(f, "failed to connect to {}: {}", endpoint, source)
			}
			ChannelError::Io(e) => write!(f, "io error: {}", e),
			ChannelError::Closed => write!(f, "channel closed"),
		}
	}
}

impl std::error::Error for ChannelError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ChannelError::Bind { source, .. } | ChannelError::Connect { source, .. } => Some(source),
			ChannelError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ChannelError {
	fn from(e: io::Error) -> Self {
		ChannelError::Io(e)
	}
}
