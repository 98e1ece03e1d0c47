use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};

use crate::endpoint::Endpoint;
use crate::error::ChannelError;

/// Pulses buffered per inlet before new arrivals are dropped.
pub const DEFAULT_CAPACITY: usize = 1024;

/// One message on a channel. Only its arrival means anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse;

/// The bound, receiving side of a channel.
///
/// Accepts connections from any number of senders. Every newline byte a
/// sender writes is delivered as one [`Pulse`]; everything else is ignored.
pub struct Inlet {
	endpoint: Option<Endpoint>,
	receiver: mpsc::Receiver<Pulse>,
	acceptor: Option<JoinHandle<()>>,
	socket_file: Option<PathBuf>,
}

impl Inlet {
	/// Bind `endpoint` and start accepting senders on the current runtime.
	///
	/// A leftover socket at an `ipc://` path is removed first. Any other kind
	/// of file there is left alone and the bind fails with `AlreadyExists`.
	pub async fn bind(endpoint: &Endpoint) -> Result<Self, ChannelError> {
		let (sender, receiver) = mpsc::channel(DEFAULT_CAPACITY);

		match endpoint {
			Endpoint::Ipc(path) => {
				clear_stale_socket(path).map_err(|source| ChannelError::Bind {
					endpoint: endpoint.clone(),
					source,
				})?;
				let listener = UnixListener::bind(path).map_err(|source| ChannelError::Bind {
					endpoint: endpoint.clone(),
					source,
				})?;
				tracing::debug!("listening on {}", endpoint);

				let acceptor = tokio::spawn(accept_unix(listener, endpoint.clone(), sender));
				Ok(Self {
					endpoint: Some(endpoint.clone()),
					receiver,
					acceptor: Some(acceptor),
					socket_file: Some(path.clone()),
				})
			}
			Endpoint::Tcp(addr) => {
				let listener = TcpListener::bind(addr.as_str())
					.await
					.map_err(|source| ChannelError::Bind {
						endpoint: endpoint.clone(),
						source,
					})?;
				let bound = listener
					.local_addr()
					.map(|a| Endpoint::Tcp(a.to_string()))
					.unwrap_or_else(|_| endpoint.clone());
				tracing::debug!("listening on {}", bound);

				let acceptor = tokio::spawn(accept_tcp(listener, bound.clone(), sender));
				Ok(Self {
					endpoint: Some(bound),
					receiver,
					acceptor: Some(acceptor),
					socket_file: None,
				})
			}
		}
	}

	/// An inlet with no transport behind it, fed through the returned sender.
	pub fn pair(capacity: usize) -> (mpsc::Sender<Pulse>, Self) {
		let (sender, receiver) = mpsc::channel(capacity.max(1));
		let inlet = Self {
			endpoint: None,
			receiver,
			acceptor: None,
			socket_file: None,
		};
		(sender, inlet)
	}

	/// The endpoint actually bound, with any `tcp://…:0` port resolved.
	pub fn local_endpoint(&self) -> Option<&Endpoint> {
		self.endpoint.as_ref()
	}

	/// Wait for the next pulse. `None` once every sender is gone.
	pub async fn recv(&mut self) -> Option<Pulse> {
		self.receiver.recv().await
	}

	/// Discard every pulse already queued. Returns how many were dropped.
	pub fn drain(&mut self) -> usize {
		let mut drained = 0;
		while self.receiver.try_recv().is_ok() {
			drained += 1;
		}
		drained
	}
}

impl Drop for Inlet {
	fn drop(&mut self) {
		if let Some(acceptor) = self.acceptor.take() {
			acceptor.abort();
		}
		if let Some(path) = self.socket_file.take() {
			let _ = std::fs::remove_file(path);
		}
	}
}

impl std::fmt::Debug for Inlet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Inlet").field("endpoint", &self.endpoint).finish()
	}
}

fn clear_stale_socket(path: &Path) -> std::io::Result<()> {
	match std::fs::symlink_metadata(path) {
		Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
		Ok(_) => Err(std::io::Error::new(
			std::io::ErrorKind::AlreadyExists,
			format!("{} exists and is not a socket", path.display()),
		)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e),
	}
}

async fn accept_unix(listener: UnixListener, endpoint: Endpoint, sender: mpsc::Sender<Pulse>) {
	let mut senders = JoinSet::new();

	loop {
		let stream = match listener.accept().await {
			Ok((s, _)) => s,
			Err(e) => {
				accept_failed(&endpoint, e).await;
				continue;
			}
		};

		while senders.try_join_next().is_some() {}
		senders.spawn(pump(stream, endpoint.clone(), sender.clone()));
	}
}

async fn accept_tcp(listener: TcpListener, endpoint: Endpoint, sender: mpsc::Sender<Pulse>) {
	let mut senders = JoinSet::new();

	loop {
		let stream = match listener.accept().await {
			Ok((s, peer)) => {
				tracing::trace!("{}: sender connected from {}", endpoint, peer);
				s
			}
			Err(e) => {
				accept_failed(&endpoint, e).await;
				continue;
			}
		};

		while senders.try_join_next().is_some() {}
		senders.spawn(pump(stream, endpoint.clone(), sender.clone()));
	}
}

async fn accept_failed(endpoint: &Endpoint, e: std::io::Error) {
	tracing::warn!("accept error on {}: {}", endpoint, ChannelError::Io(e));
	// Errors like EMFILE repeat immediately; back off instead of spinning.
	tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, endpoint: Endpoint, sender: mpsc::Sender<Pulse>) {
	let mut buf = [0u8; 512];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				for _ in buf[..n].iter().filter(|&&b| b == b'\n') {
					match sender.try_send(Pulse) {
						Ok(()) => {}
						Err(TrySendError::Full(_)) => {
							tracing::trace!("{}: queue full, pulse dropped", endpoint);
						}
						Err(TrySendError::Closed(_)) => return,
					}
				}
			}
			Err(e) => {
				tracing::warn!("read error on {}: {}", endpoint, ChannelError::Io(e));
				break;
			}
		}
	}
}
