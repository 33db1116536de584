//! `#<decimal length>#<payload>` framing over a byte stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Message, Result};

/// Largest payload accepted from a peer.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Digits needed for `MAX_FRAME_LEN`.
const MAX_LEN_DIGITS: usize = 7;

pub fn encode(payload: &[u8], dst: &mut BytesMut) {
  let header = format!("#{}#", payload.len());
  dst.reserve(header.len() + payload.len());
  dst.put_slice(header.as_bytes());
  dst.put_slice(payload);
}

/// Split one complete frame off the front of `src`. Returns `Ok(None)` when
/// more bytes are needed.
pub fn decode(src: &mut BytesMut) -> Result<Option<Bytes>> {
  let Some(&first) = src.first() else {
    return Ok(None);
  };
  if first != b'#' {
    return Err(Error::Frame(format!("expected '#', found byte {first:#04x}")));
  }

  let digits = &src[1..];
  let Some(end) = digits.iter().take(MAX_LEN_DIGITS + 1).position(|&b| b == b'#') else {
    if digits.len() > MAX_LEN_DIGITS {
      return Err(Error::Frame("length prefix too long".into()));
    }
    return Ok(None);
  };
  let digits = &digits[..end];
  if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
    return Err(Error::Frame("length prefix is not a decimal number".into()));
  }
  let len: usize = std::str::from_utf8(digits)
    .ok()
    .and_then(|s| s.parse().ok())
    .ok_or_else(|| Error::Frame("length prefix is not a decimal number".into()))?;
  if len > MAX_FRAME_LEN {
    return Err(Error::Frame(format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}")));
  }

  let header = end + 2;
  if src.len() < header + len {
    src.reserve(header + len - src.len());
    return Ok(None);
  }
  src.advance(header);
  Ok(Some(src.split_to(len).freeze()))
}

/// A byte stream carrying one [`Message`] per frame.
///
/// `recv` is cancel-safe: partially read frames stay buffered.
pub struct FramedStream<S> {
  io:  S,
  buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedStream<S> {
  pub fn new(io: S) -> Self { Self { io, buf: BytesMut::with_capacity(4096) } }

  pub async fn send(&mut self, message: &Message) -> Result<()> {
    let mut out = BytesMut::new();
    encode(&message.encode()?, &mut out);
    self.io.write_all(&out).await?;
    self.io.flush().await?;
    Ok(())
  }

  /// The next message, or `None` once the peer closed the stream cleanly.
  pub async fn recv(&mut self) -> Result<Option<Message>> {
    loop {
      if let Some(frame) = decode(&mut self.buf)? {
        return Message::decode(&frame).map(Some);
      }
      if self.io.read_buf(&mut self.buf).await? == 0 {
        if self.buf.is_empty() {
          return Ok(None);
        }
        return Err(Error::Frame("stream closed mid-frame".into()));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frames(input: &[u8]) -> Result<Vec<Bytes>> {
    let mut buf = BytesMut::from(input);
    let mut out = Vec::new();
    while let Some(frame) = decode(&mut buf)? {
      out.push(frame);
    }
    Ok(out)
  }

  #[test]
  fn encodes_length_prefix() {
    let mut buf = BytesMut::new();
    encode(br#"{"type":1}"#, &mut buf);
    assert_eq!(&buf[..], br##"#10#{"type":1}"##);
  }

  #[test]
  fn decodes_back_to_back_frames() {
    let out = frames(b"#3#abc#0##2#de").unwrap();
    assert_eq!(out, vec![
      Bytes::from_static(b"abc"),
      Bytes::new(),
      Bytes::from_static(b"de"),
    ]);
  }

  #[test]
  fn waits_for_partial_frames() {
    let mut buf = BytesMut::from(&b"#5#ab"[..]);
    assert!(decode(&mut buf).unwrap().is_none());
    buf.extend_from_slice(b"cde");
    assert_eq!(decode(&mut buf).unwrap().unwrap(), Bytes::from_static(b"abcde"));
    assert!(buf.is_empty());

    let mut header = BytesMut::from(&b"#12"[..]);
    assert!(decode(&mut header).unwrap().is_none());
  }

  #[test]
  fn rejects_malformed_headers() {
    assert!(frames(b"5#abcde").is_err());
    assert!(frames(b"#x#a").is_err());
    assert!(frames(b"##").is_err());
    assert!(frames(b"#123456789").is_err());
  }

  #[test]
  fn rejects_oversized_frames() {
    let header = format!("#{}#", MAX_FRAME_LEN + 1);
    let err = frames(header.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::Frame(_)));
  }

  #[tokio::test]
  async fn stream_round_trip() {
    let (a, b) = tokio::io::duplex(64);
    let mut left = FramedStream::new(a);
    let mut right = FramedStream::new(b);

    left.send(&Message::ListenReq).await.unwrap();
    assert_eq!(right.recv().await.unwrap(), Some(Message::ListenReq));

    drop(left);
    assert_eq!(right.recv().await.unwrap(), None);
  }
}
