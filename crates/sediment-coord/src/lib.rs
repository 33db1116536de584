//! Coordination protocol between the Sediment worker and its followers.
//!
//! Exactly one process per deployment is the archive worker. It listens on a
//! TCP or Unix socket; every follower keeps one connection open to it and
//! forwards tiering requests instead of running them. Messages travel as
//! `#<len>#<json>` frames, one message per frame, and each request is
//! answered with a single [`Ack`].

pub mod error;
pub mod follower;
pub mod frame;
pub mod message;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};
pub use follower::{ConnectionState, Follower};
pub use frame::FramedStream;
pub use message::{Ack, Message};
pub use transport::{Endpoint, Listener, TransportKind};
pub use worker::serve;

#[cfg(test)]
mod tests;
