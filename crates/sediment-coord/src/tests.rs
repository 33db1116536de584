//! Worker/follower tests over loopback sockets.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use sediment_core::{ArchiveControl, Classify, DataKind, ErrorClass, SiteId};

use crate::{
  ConnectionState, Endpoint, Error, FramedStream, Follower, Listener, Message, serve, transport,
};

#[derive(Debug, thiserror::Error)]
#[error("rotation in progress")]
struct Busy;

impl Classify for Busy {
  fn class(&self) -> ErrorClass { ErrorClass::Precondition }
}

/// Records every call; refuses them all when `busy` is set.
#[derive(Clone, Default)]
struct Recorder {
  calls: Arc<Mutex<Vec<String>>>,
  busy:  bool,
}

impl Recorder {
  fn record(&self, call: String) -> Result<(), Busy> {
    self.calls.lock().unwrap().push(call);
    if self.busy { Err(Busy) } else { Ok(()) }
  }

  fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }
}

impl ArchiveControl for Recorder {
  type Error = Busy;

  async fn trigger_rotation(&self, site: SiteId, immediate: bool) -> Result<(), Busy> {
    self.record(format!("rotate {site} {immediate}"))
  }

  async fn activate_archive(&self, site: SiteId, kind: DataKind, table: String) -> Result<(), Busy> {
    self.record(format!("activate {site} {kind} {table}"))
  }

  async fn trigger_archive_rollback(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> Result<(), Busy> {
    self.record(format!("touch {site} {kind} {table}"))
  }

  async fn clear_archive_table(&self, site: SiteId, kind: DataKind) -> Result<(), Busy> {
    self.record(format!("clear {site} {kind}"))
  }
}

fn site() -> SiteId { SiteId::new("s001").unwrap() }

async fn worker(control: Recorder) -> Endpoint {
  let listener = Listener::bind(&Endpoint::Tcp("127.0.0.1:0".into())).await.unwrap();
  let endpoint = listener.local_endpoint().unwrap();
  tokio::spawn(serve(listener, control));
  endpoint
}

async fn listening(endpoint: Endpoint) -> Follower {
  let (follower, _task) =
    Follower::spawn(endpoint, Duration::from_millis(50), Duration::from_secs(2));
  let mut state = follower.subscribe();
  tokio::time::timeout(
    Duration::from_secs(5),
    state.wait_for(|s| *s == ConnectionState::Listening),
  )
  .await
  .unwrap()
  .unwrap();
  follower
}

#[tokio::test]
async fn follower_forwards_every_request() {
  let recorder = Recorder::default();
  let follower = listening(worker(recorder.clone()).await).await;

  follower.trigger_rotation(site(), false).await.unwrap();
  follower
    .activate_archive(site(), DataKind::Hourly, "s001_hourdata_20240101_20240201".into())
    .await
    .unwrap();
  follower
    .trigger_archive_rollback(site(), DataKind::Hourly, "s001_hourdata_20240101_20240201".into())
    .await
    .unwrap();
  follower.clear_archive_table(site(), DataKind::Daily).await.unwrap();

  assert_eq!(recorder.calls(), vec![
    "rotate s001 false".to_owned(),
    "activate s001 hourly s001_hourdata_20240101_20240201".to_owned(),
    "touch s001 hourly s001_hourdata_20240101_20240201".to_owned(),
    "clear s001 daily".to_owned(),
  ]);
}

#[tokio::test]
async fn worker_refusal_keeps_its_class() {
  let recorder = Recorder { busy: true, ..Recorder::default() };
  let follower = listening(worker(recorder).await).await;

  let err = follower.trigger_rotation(site(), true).await.unwrap_err();
  assert!(matches!(err, Error::Rejected { class: ErrorClass::Precondition, .. }));
  assert_eq!(err.class(), ErrorClass::Precondition);
}

#[tokio::test]
async fn requests_fail_fast_without_a_worker() {
  let listener = Listener::bind(&Endpoint::Tcp("127.0.0.1:0".into())).await.unwrap();
  let endpoint = listener.local_endpoint().unwrap();
  drop(listener);

  let (follower, _task) = Follower::spawn(endpoint, Duration::from_secs(60), Duration::from_secs(1));
  let err = follower.trigger_rotation(site(), false).await.unwrap_err();
  assert!(matches!(err, Error::NotConnected));
  assert_eq!(err.class(), ErrorClass::Unavailable);
}

#[tokio::test]
async fn worker_requires_listen_first() {
  let recorder = Recorder::default();
  let endpoint = worker(recorder.clone()).await;

  let mut framed = FramedStream::new(transport::connect(&endpoint).await.unwrap());
  framed.send(&Message::TriggerRotation { site: site(), immediate: true }).await.unwrap();
  match framed.recv().await.unwrap() {
    Some(Message::Ack(ack)) => assert!(!ack.is_ok()),
    other => panic!("expected a failure ack, got {other:?}"),
  }
  assert_eq!(framed.recv().await.unwrap(), None);
  assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn follower_reconnects_after_worker_restart() {
  let listener = Listener::bind(&Endpoint::Tcp("127.0.0.1:0".into())).await.unwrap();
  let endpoint = listener.local_endpoint().unwrap();
  let first = tokio::spawn(serve(listener, Recorder::default()));
  let follower = listening(endpoint.clone()).await;

  first.abort();
  let mut state = follower.subscribe();
  tokio::time::timeout(
    Duration::from_secs(5),
    state.wait_for(|s| *s != ConnectionState::Listening),
  )
  .await
  .unwrap()
  .unwrap();

  let recorder = Recorder::default();
  let listener = Listener::bind(&endpoint).await.unwrap();
  tokio::spawn(serve(listener, recorder.clone()));
  tokio::time::timeout(
    Duration::from_secs(5),
    state.wait_for(|s| *s == ConnectionState::Listening),
  )
  .await
  .unwrap()
  .unwrap();

  follower.clear_archive_table(site(), DataKind::Realtime).await.unwrap();
  assert_eq!(recorder.calls(), vec!["clear s001 realtime".to_owned()]);
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_transport() {
  let path = std::env::temp_dir().join(format!("sediment-coord-{}.sock", std::process::id()));
  let recorder = Recorder::default();
  let listener = Listener::bind(&Endpoint::Unix(path.clone())).await.unwrap();
  tokio::spawn(serve(listener, recorder.clone()));

  let follower = listening(Endpoint::Unix(path.clone())).await;
  follower.trigger_rotation(site(), true).await.unwrap();
  assert_eq!(recorder.calls(), vec!["rotate s001 true".to_owned()]);
  let _ = std::fs::remove_file(path);
}
