use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ChannelError;

/// Where a channel lives.
///
/// Written as `ipc://<path>` for a Unix domain socket or `tcp://<host:port>`.
/// A string without a scheme is taken as a socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
	Ipc(PathBuf),
	Tcp(String),
}

impl Endpoint {
	pub fn parse(raw: &str) -> Result<Self, ChannelError> {
		let raw = raw.trim();
		if raw.is_empty() {
			return Err(ChannelError::Address(raw.to_string()));
		}

		match raw.split_once("://") {
			Some(("ipc", path)) if !path.is_empty() => Ok(Endpoint::Ipc(PathBuf::from(path))),
			Some(("tcp", addr)) if is_host_port(addr) => Ok(Endpoint::Tcp(addr.to_string())),
			Some(_) => Err(ChannelError::Address(raw.to_string())),
			None => Ok(Endpoint::Ipc(PathBuf::from(raw))),
		}
	}

	pub fn ipc(path: impl Into<PathBuf>) -> Self {
		Endpoint::Ipc(path.into())
	}
}

fn is_host_port(addr: &str) -> bool {
	match addr.rsplit_once(':') {
		Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
		None => false,
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
			Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
		}
	}
}

impl FromStr for Endpoint {
	type Err = ChannelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Endpoint::parse(s)
	}
}
