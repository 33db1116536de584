//! Worker side: accept follower connections and execute their requests.

use sediment_core::ArchiveControl;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{Ack, Error, FramedStream, Listener, Message, Result, transport::BoxStream};

/// Accept followers on `listener` until the returned future is dropped,
/// which also ends every open session.
pub async fn serve<A>(listener: Listener, control: A) -> Result<()>
where
  A: ArchiveControl + Clone + 'static,
{
  info!(endpoint = %listener.local_endpoint()?, "coordination listener started");
  let mut sessions = JoinSet::new();
  loop {
    tokio::select! {
      accepted = listener.accept() => {
        let (stream, peer) = match accepted {
          Ok(accepted) => accepted,
          Err(e) => {
            warn!(error = %e, "failed to accept follower connection");
            continue;
          }
        };
        let control = control.clone();
        sessions.spawn(async move {
          match session(stream, &peer, &control).await {
            Ok(()) => info!(%peer, "follower disconnected"),
            Err(e) => warn!(%peer, error = %e, "follower session ended"),
          }
        });
      }
      Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
    }
  }
}

async fn session<A: ArchiveControl>(stream: BoxStream, peer: &str, control: &A) -> Result<()> {
  let mut framed = FramedStream::new(stream);

  match framed.recv().await? {
    Some(Message::ListenReq) => framed.send(&Message::Ack(Ack::ok())).await?,
    Some(other) => {
      let err = Error::UnexpectedMessage(other.name());
      framed.send(&Message::Ack(Ack::failed(&err))).await?;
      return Err(err);
    }
    None => return Ok(()),
  }
  info!(%peer, "follower listening");

  while let Some(message) = framed.recv().await? {
    debug!(%peer, message = message.name(), "request received");
    let ack = dispatch(control, message).await;
    framed.send(&Message::Ack(ack)).await?;
  }
  Ok(())
}

/// Execute one forwarded request and build its response.
pub async fn dispatch<A: ArchiveControl>(control: &A, message: Message) -> Ack {
  let result = match message {
    Message::TriggerRotation { site, immediate } => {
      control.trigger_rotation(site, immediate).await
    }
    Message::ArchiveActivate { site, kind, table } => {
      control.activate_archive(site, kind, table).await
    }
    Message::TriggerArchiveRollback { site, kind, table } => {
      control.trigger_archive_rollback(site, kind, table).await
    }
    Message::ClearArchiveEntry { site, kind } => control.clear_archive_table(site, kind).await,
    other @ (Message::Ack(_) | Message::ListenReq) => {
      return Ack::failed(&Error::UnexpectedMessage(other.name()));
    }
  };
  match result {
    Ok(()) => Ack::ok(),
    Err(e) => {
      warn!(error = %e, "forwarded request failed");
      Ack::failed(&e)
    }
  }
}
