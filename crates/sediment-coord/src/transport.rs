//! Socket plumbing: where the worker listens and how followers reach it.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use tokio::{
  io::{AsyncRead, AsyncWrite},
  net::{TcpListener, TcpStream},
};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
  #[default]
  Tcp,
  Unix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  /// `host:port`
  Tcp(String),
  /// Path of a Unix domain socket.
  Unix(PathBuf),
}

impl Endpoint {
  pub fn new(kind: TransportKind, address: impl Into<String>) -> Self {
    match kind {
      TransportKind::Tcp => Endpoint::Tcp(address.into()),
      TransportKind::Unix => Endpoint::Unix(PathBuf::from(address.into())),
    }
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
      Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
    }
  }
}

pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxStream = Box<dyn Stream>;

pub async fn connect(endpoint: &Endpoint) -> Result<BoxStream> {
  match endpoint {
    Endpoint::Tcp(addr) => {
      let stream = TcpStream::connect(addr).await?;
      stream.set_nodelay(true)?;
      Ok(Box::new(stream))
    }
    #[cfg(unix)]
    Endpoint::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
    #[cfg(not(unix))]
    Endpoint::Unix(_) => Err(crate::Error::UnixUnsupported),
  }
}

pub enum Listener {
  Tcp(TcpListener),
  #[cfg(unix)]
  Unix(tokio::net::UnixListener, PathBuf),
}

impl Listener {
  /// Bind `endpoint`. A stale Unix socket file left by a previous process is
  /// removed first.
  pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
    match endpoint {
      Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr).await?)),
      #[cfg(unix)]
      Endpoint::Unix(path) => {
        match tokio::fs::remove_file(path).await {
          Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
          Err(e) => return Err(e.into()),
        }
        Ok(Listener::Unix(tokio::net::UnixListener::bind(path)?, path.clone()))
      }
      #[cfg(not(unix))]
      Endpoint::Unix(_) => Err(crate::Error::UnixUnsupported),
    }
  }

  /// The endpoint actually bound (resolves port 0).
  pub fn local_endpoint(&self) -> Result<Endpoint> {
    match self {
      Listener::Tcp(l) => Ok(Endpoint::Tcp(l.local_addr()?.to_string())),
      #[cfg(unix)]
      Listener::Unix(_, path) => Ok(Endpoint::Unix(path.clone())),
    }
  }

  /// Accept one connection; also returns a printable peer name.
  pub async fn accept(&self) -> Result<(BoxStream, String)> {
    match self {
      Listener::Tcp(l) => {
        let (stream, addr) = l.accept().await?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), addr.to_string()))
      }
      #[cfg(unix)]
      Listener::Unix(l, path) => {
        let (stream, _) = l.accept().await?;
        Ok((Box::new(stream), path.display().to_string()))
      }
    }
  }
}
