//! The closed set of coordination messages and their JSON envelope.
//!
//! On the wire every message is `{"type": <tag>, "message": <payload>}`:
//!
//! | tag | message                     | payload                          |
//! |-----|-----------------------------|----------------------------------|
//! | 0   | `Ack`                       | `{"code": 0 \| 1, "error"?, "class"?}` |
//! | 1   | `ListenReq`                 | `{}`                             |
//! | 2   | `TriggerRotationReq`        | `{"site", "immediate"}`          |
//! | 3   | `ArchiveActivateReq`        | `{"site", "kind", "table"}`      |
//! | 4   | `TriggerArchiveRollbackReq` | `{"site", "kind", "table"}`      |
//! | 5   | `ClearArchiveEntryReq`      | `{"site", "kind"}`               |

use std::fmt;

use sediment_core::{Classify, DataKind, ErrorClass, SiteId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
  Ack(Ack),
  ListenReq,
  TriggerRotation { site: SiteId, immediate: bool },
  ArchiveActivate { site: SiteId, kind: DataKind, table: String },
  TriggerArchiveRollback { site: SiteId, kind: DataKind, table: String },
  ClearArchiveEntry { site: SiteId, kind: DataKind },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  tag:     u8,
  #[serde(default)]
  message: Value,
}

#[derive(Serialize, Deserialize)]
struct RotationPayload {
  site:      SiteId,
  immediate: bool,
}

#[derive(Serialize, Deserialize)]
struct TablePayload {
  site:  SiteId,
  kind:  DataKind,
  table: String,
}

#[derive(Serialize, Deserialize)]
struct KindPayload {
  site: SiteId,
  kind: DataKind,
}

impl Message {
  pub fn tag(&self) -> u8 {
    match self {
      Message::Ack(_) => 0,
      Message::ListenReq => 1,
      Message::TriggerRotation { .. } => 2,
      Message::ArchiveActivate { .. } => 3,
      Message::TriggerArchiveRollback { .. } => 4,
      Message::ClearArchiveEntry { .. } => 5,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Message::Ack(_) => "Ack",
      Message::ListenReq => "ListenReq",
      Message::TriggerRotation { .. } => "TriggerRotationReq",
      Message::ArchiveActivate { .. } => "ArchiveActivateReq",
      Message::TriggerArchiveRollback { .. } => "TriggerArchiveRollbackReq",
      Message::ClearArchiveEntry { .. } => "ClearArchiveEntryReq",
    }
  }

  /// Serialize to the JSON envelope carried in one frame.
  pub fn encode(&self) -> Result<Vec<u8>> {
    let message = match self {
      Message::Ack(ack) => serde_json::to_value(ack)?,
      Message::ListenReq => Value::Object(Default::default()),
      Message::TriggerRotation { site, immediate } => {
        serde_json::to_value(RotationPayload { site: site.clone(), immediate: *immediate })?
      }
      Message::ArchiveActivate { site, kind, table }
      | Message::TriggerArchiveRollback { site, kind, table } => {
        serde_json::to_value(TablePayload { site: site.clone(), kind: *kind, table: table.clone() })?
      }
      Message::ClearArchiveEntry { site, kind } => {
        serde_json::to_value(KindPayload { site: site.clone(), kind: *kind })?
      }
    };
    Ok(serde_json::to_vec(&Envelope { tag: self.tag(), message })?)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self> {
    let Envelope { tag, message } = serde_json::from_slice(bytes)?;
    let message = match tag {
      0 => Message::Ack(payload(message)?),
      1 => Message::ListenReq,
      2 => {
        let RotationPayload { site, immediate } = payload(message)?;
        Message::TriggerRotation { site, immediate }
      }
      3 => {
        let TablePayload { site, kind, table } = payload(message)?;
        Message::ArchiveActivate { site, kind, table }
      }
      4 => {
        let TablePayload { site, kind, table } = payload(message)?;
        Message::TriggerArchiveRollback { site, kind, table }
      }
      5 => {
        let KindPayload { site, kind } = payload(message)?;
        Message::ClearArchiveEntry { site, kind }
      }
      other => return Err(Error::UnknownMessageType(other)),
    };
    Ok(message)
  }
}

fn payload<T: DeserializeOwned>(value: Value) -> Result<T> { Ok(serde_json::from_value(value)?) }

// ─── Ack ─────────────────────────────────────────────────────────────────────

/// Response to every request. `code` is 0 on success and 1 on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
  pub code:  u8,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub class: Option<ErrorClass>,
}

impl Ack {
  pub const SUCCESS: u8 = 0;
  pub const FAILURE: u8 = 1;

  pub fn ok() -> Self { Self { code: Self::SUCCESS, error: None, class: None } }

  pub fn failed<E: Classify + fmt::Display>(error: &E) -> Self {
    Self { code: Self::FAILURE, error: Some(error.to_string()), class: Some(error.class()) }
  }

  pub fn is_ok(&self) -> bool { self.code == Self::SUCCESS }

  /// Turn a failure `Ack` into [`Error::Rejected`].
  pub fn into_result(self) -> Result<()> {
    if self.is_ok() {
      return Ok(());
    }
    Err(Error::Rejected {
      class:   self.class.unwrap_or(ErrorClass::Internal),
      message: self.error.unwrap_or_else(|| "unspecified failure".to_owned()),
    })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn site() -> SiteId { SiteId::new("s001").unwrap() }

  fn wire(message: &Message) -> Value { serde_json::from_slice(&message.encode().unwrap()).unwrap() }

  #[test]
  fn rotation_request_wire_format() {
    let msg = Message::TriggerRotation { site: site(), immediate: true };
    assert_eq!(wire(&msg), json!({"type": 2, "message": {"site": "s001", "immediate": true}}));
  }

  #[test]
  fn table_requests_carry_kind_and_table() {
    let msg = Message::ArchiveActivate {
      site:  site(),
      kind:  DataKind::Hourly,
      table: "s001_hourdata_20240101_20240201".into(),
    };
    assert_eq!(
      wire(&msg),
      json!({"type": 3, "message": {
        "site": "s001", "kind": "hourly", "table": "s001_hourdata_20240101_20240201"
      }})
    );
    assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
  }

  #[test]
  fn listen_and_ack_wire_format() {
    assert_eq!(wire(&Message::ListenReq), json!({"type": 1, "message": {}}));
    assert_eq!(wire(&Message::Ack(Ack::ok())), json!({"type": 0, "message": {"code": 0}}));
  }

  #[test]
  fn decodes_listen_without_payload() {
    assert_eq!(Message::decode(br#"{"type":1}"#).unwrap(), Message::ListenReq);
  }

  #[test]
  fn unknown_tag_is_rejected() {
    let err = Message::decode(br#"{"type":9,"message":{}}"#).unwrap_err();
    assert!(matches!(err, Error::UnknownMessageType(9)));
  }

  #[test]
  fn bad_site_is_rejected() {
    let err =
      Message::decode(br#"{"type":5,"message":{"site":"no/slash","kind":"daily"}}"#).unwrap_err();
    assert!(matches!(err, Error::Json(_)));
  }

  #[test]
  fn failure_ack_keeps_class() {
    let ack: Ack = serde_json::from_value(
      json!({"code": 1, "error": "rotation in progress", "class": "precondition"}),
    )
    .unwrap();
    match ack.into_result() {
      Err(Error::Rejected { class, message }) => {
        assert_eq!(class, ErrorClass::Precondition);
        assert_eq!(message, "rotation in progress");
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn bare_failure_ack_is_internal() {
    let ack: Ack = serde_json::from_value(json!({"code": 1})).unwrap();
    assert!(matches!(
      ack.into_result(),
      Err(Error::Rejected { class: ErrorClass::Internal, .. })
    ));
  }
}
