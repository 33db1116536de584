//! Follower side: one long-lived connection to the worker, reconnecting on
//! a fixed interval, over which tiering requests are forwarded.
//!
//! There is no retry queue. A request made while the connection is down, or
//! one the worker does not answer in time, fails and is dropped.

use std::{sync::Arc, time::Duration};

use sediment_core::{ArchiveControl, DataKind, SiteId};
use tokio::{
  sync::{mpsc, oneshot, watch},
  task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
  Ack, Endpoint, Error, FramedStream, Message, Result,
  transport::{self, BoxStream},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Listening,
}

struct Request {
  message: Message,
  reply:   oneshot::Sender<Result<()>>,
}

/// Handle to the connector task. Cheap to clone.
#[derive(Clone)]
pub struct Follower {
  inner: Arc<Inner>,
}

struct Inner {
  requests: mpsc::Sender<Request>,
  state:    watch::Receiver<ConnectionState>,
  timeout:  Duration,
}

impl Follower {
  /// Start the connector task for `endpoint`.
  pub fn spawn(
    endpoint: Endpoint,
    reconnect: Duration,
    timeout: Duration,
  ) -> (Self, JoinHandle<()>) {
    let (requests, rx) = mpsc::channel(64);
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
    let task = tokio::spawn(connector(endpoint, reconnect, timeout, rx, state_tx));
    (Self { inner: Arc::new(Inner { requests, state, timeout }) }, task)
  }

  pub fn state(&self) -> ConnectionState { *self.inner.state.borrow() }

  pub fn subscribe(&self) -> watch::Receiver<ConnectionState> { self.inner.state.clone() }

  /// Forward `message` to the worker and wait for its `Ack`.
  pub async fn request(&self, message: Message) -> Result<()> {
    let name = message.name();
    let result = self.forward(message).await;
    if let Err(e) = &result {
      warn!(message = name, error = %e, "request to archive worker failed");
    }
    result
  }

  async fn forward(&self, message: Message) -> Result<()> {
    if self.state() != ConnectionState::Listening {
      return Err(Error::NotConnected);
    }
    let (reply, response) = oneshot::channel();
    self
      .inner
      .requests
      .send(Request { message, reply })
      .await
      .map_err(|_| Error::NotConnected)?;
    // The connector enforces the timeout per request; this bounds the wait
    // for requests queued behind a stalled one.
    match tokio::time::timeout(self.inner.timeout * 2, response).await {
      Ok(Ok(result)) => result,
      Ok(Err(_)) => Err(Error::NotConnected),
      Err(_) => Err(Error::Timeout(self.inner.timeout)),
    }
  }
}

impl ArchiveControl for Follower {
  type Error = Error;

  async fn trigger_rotation(&self, site: SiteId, immediate: bool) -> Result<()> {
    self.request(Message::TriggerRotation { site, immediate }).await
  }

  async fn activate_archive(&self, site: SiteId, kind: DataKind, table: String) -> Result<()> {
    self.request(Message::ArchiveActivate { site, kind, table }).await
  }

  async fn trigger_archive_rollback(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> Result<()> {
    self.request(Message::TriggerArchiveRollback { site, kind, table }).await
  }

  async fn clear_archive_table(&self, site: SiteId, kind: DataKind) -> Result<()> {
    self.request(Message::ClearArchiveEntry { site, kind }).await
  }
}

// ─── Connector task ──────────────────────────────────────────────────────────

async fn connector(
  endpoint: Endpoint,
  reconnect: Duration,
  timeout: Duration,
  mut requests: mpsc::Receiver<Request>,
  state: watch::Sender<ConnectionState>,
) {
  loop {
    state.send_replace(ConnectionState::Connecting);
    match listen(&endpoint, timeout).await {
      Ok(mut framed) => {
        state.send_replace(ConnectionState::Listening);
        info!(%endpoint, "listening to archive worker");
        match pump(&mut framed, &mut requests, timeout).await {
          Ok(true) => {}
          Ok(false) => {
            state.send_replace(ConnectionState::Disconnected);
            return;
          }
          Err(e) => warn!(%endpoint, error = %e, "connection to archive worker lost"),
        }
      }
      Err(e) => warn!(%endpoint, error = %e, "cannot reach archive worker"),
    }
    state.send_replace(ConnectionState::Disconnected);

    // Anything queued during the outage fails now rather than after reconnect.
    loop {
      match requests.try_recv() {
        Ok(request) => {
          let _ = request.reply.send(Err(Error::NotConnected));
        }
        Err(mpsc::error::TryRecvError::Empty) => break,
        Err(mpsc::error::TryRecvError::Disconnected) => return,
      }
    }
    tokio::time::sleep(reconnect).await;
  }
}

/// Connect and complete the `ListenReq` handshake.
async fn listen(endpoint: &Endpoint, timeout: Duration) -> Result<FramedStream<BoxStream>> {
  let stream = tokio::time::timeout(timeout, transport::connect(endpoint))
    .await
    .map_err(|_| Error::Timeout(timeout))??;
  let mut framed = FramedStream::new(stream);
  framed.send(&Message::ListenReq).await?;
  expect_ack(&mut framed, timeout).await?.into_result()?;
  Ok(framed)
}

/// Forward queued requests over an established connection. Returns
/// `Ok(true)` when the worker closed the connection and `Ok(false)` once
/// every `Follower` handle is gone.
async fn pump(
  framed: &mut FramedStream<BoxStream>,
  requests: &mut mpsc::Receiver<Request>,
  timeout: Duration,
) -> Result<bool> {
  loop {
    tokio::select! {
      request = requests.recv() => {
        let Some(Request { message, reply }) = request else {
          return Ok(false);
        };
        if let Err(e) = framed.send(&message).await {
          let _ = reply.send(Err(Error::NotConnected));
          return Err(e);
        }
        match expect_ack(framed, timeout).await {
          Ok(ack) => {
            let _ = reply.send(ack.into_result());
          }
          Err(e) => {
            // The stream is out of step with our requests; start over.
            let _ = reply.send(Err(match e {
              Error::Timeout(d) => Error::Timeout(d),
              _ => Error::NotConnected,
            }));
            return Err(e);
          }
        }
      }
      incoming = framed.recv() => match incoming? {
        None => return Ok(true),
        Some(other) => return Err(Error::UnexpectedMessage(other.name())),
      },
    }
  }
}

async fn expect_ack(framed: &mut FramedStream<BoxStream>, timeout: Duration) -> Result<Ack> {
  match tokio::time::timeout(timeout, framed.recv()).await {
    Err(_) => Err(Error::Timeout(timeout)),
    Ok(Ok(Some(Message::Ack(ack)))) => Ok(ack),
    Ok(Ok(Some(other))) => Err(Error::UnexpectedMessage(other.name())),
    Ok(Ok(None)) => Err(Error::NotConnected),
    Ok(Err(e)) => Err(e),
  }
}
