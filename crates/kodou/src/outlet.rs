use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

use crate::endpoint::Endpoint;
use crate::error::ChannelError;

type Stream = Box<dyn AsyncWrite + Unpin + Send>;

/// Sending side of a channel.
///
/// Connects on first use and again after any failed push, so a sender can
/// outlive the inlet it talks to.
pub struct Outlet {
	endpoint: Endpoint,
	stream: Option<Stream>,
}

impl Outlet {
	/// A sender that connects lazily on the first [`push`](Self::push).
	pub fn new(endpoint: Endpoint) -> Self {
		Self {
			endpoint,
			stream: None,
		}
	}

	/// Connect right away. Fails with [`ChannelError::Connect`] if nothing is bound.
	pub async fn connect(endpoint: Endpoint) -> Result<Self, ChannelError> {
		let stream = open(&endpoint).await?;
		Ok(Self {
			endpoint,
			stream: Some(stream),
		})
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	/// Send one pulse.
	pub async fn push(&mut self) -> Result<(), ChannelError> {
		let mut stream = match self.stream.take() {
			Some(s) => s,
			None => open(&self.endpoint).await?,
		};

		stream.write_all(b"\n").await?;
		stream.flush().await?;
		self.stream = Some(stream);
		Ok(())
	}
}

/// Connect to `endpoint`, send a single pulse and hang up.
pub async fn push_once(endpoint: &Endpoint) -> Result<(), ChannelError> {
	let mut outlet = Outlet::connect(endpoint.clone()).await?;
	outlet.push().await?;
	if let Some(mut stream) = outlet.stream.take() {
		let _ = stream.shutdown().await;
	}
	Ok(())
}

async fn open(endpoint: &Endpoint) -> Result<Stream, ChannelError> {
	let connect_err = |source| ChannelError::Connect {
		endpoint: endpoint.clone(),
		source,
	};

	match endpoint {
		Endpoint::Ipc(path) => {
			let stream = UnixStream::connect(path).await.map_err(connect_err)?;
			Ok(Box::new(stream))
		}
		Endpoint::Tcp(addr) => {
			let stream = TcpStream::connect(addr.as_str()).await.map_err(connect_err)?;
			stream.set_nodelay(true)?;
			Ok(Box::new(stream))
		}
	}
}
