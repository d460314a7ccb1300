//! Engine.IO v4 and Socket.IO v5 packet encoding, text frames only.
//!
//! Engine.IO frames a long-polling response as packets joined by the record
//! separator `\x1e`, each one a type digit followed by its data. Socket.IO
//! packets travel inside Engine.IO `message` (`4`) packets:
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json>]
//! ```

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Separates packets in a polling payload.
pub const SEPARATOR: char = '\x1e';

// ─── Engine.IO ───────────────────────────────────────────────────────────────

/// Data of the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
  pub sid:           String,
  #[serde(default)]
  pub upgrades:      Vec<String>,
  /// Milliseconds.
  pub ping_interval: u64,
  /// Milliseconds.
  pub ping_timeout:  u64,
  #[serde(default)]
  pub max_payload:   Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
  Open(Handshake),
  Close,
  Ping,
  Pong,
  Message(String),
  Upgrade,
  Noop,
}

impl EnginePacket {
  pub fn decode(raw: &str) -> Result<Self> {
    let mut chars = raw.chars();
    let kind = chars
      .next()
      .ok_or_else(|| Error::Protocol("empty engine packet".into()))?;
    let data = chars.as_str();
    Ok(match kind {
      '0' => EnginePacket::Open(serde_json::from_str(data)?),
      '1' => EnginePacket::Close,
      '2' => EnginePacket::Ping,
      '3' => EnginePacket::Pong,
      '4' => EnginePacket::Message(data.to_string()),
      '5' => EnginePacket::Upgrade,
      '6' => EnginePacket::Noop,
      'b' => return Err(Error::Protocol("binary engine packets are not supported".into())),
      other => return Err(Error::Protocol(format!("unknown engine packet type {other:?}"))),
    })
  }

  /// Encode a client-to-server packet.
  pub fn encode(&self) -> String {
    match self {
      EnginePacket::Open(_) => "0".into(),
      EnginePacket::Close => "1".into(),
      EnginePacket::Ping => "2".into(),
      EnginePacket::Pong => "3".into(),
      EnginePacket::Message(data) => format!("4{data}"),
      EnginePacket::Upgrade => "5".into(),
      EnginePacket::Noop => "6".into(),
    }
  }
}

/// Split a polling response body into packets. Packets that do not decode
/// are skipped so the rest of the poll still lands.
pub fn decode_payload(body: &str) -> Vec<EnginePacket> {
  body
    .split(SEPARATOR)
    .filter(|raw| !raw.is_empty())
    .filter_map(|raw| match EnginePacket::decode(raw) {
      Ok(packet) => Some(packet),
      Err(error) => {
        warn!(%error, "skipping engine packet");
        None
      }
    })
    .collect()
}

pub fn encode_payload(packets: &[EnginePacket]) -> String {
  packets
    .iter()
    .map(EnginePacket::encode)
    .collect::<Vec<_>>()
    .join(&SEPARATOR.to_string())
}

// ─── Socket.IO ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
  Connect { namespace: String, data: Option<Value> },
  Disconnect { namespace: String },
  Event { namespace: String, name: String, payload: Value },
  Ack { namespace: String, id: u64 },
  ConnectError { namespace: String, data: Option<Value> },
}

impl SocketPacket {
  pub fn namespace(&self) -> &str {
    match self {
      SocketPacket::Connect { namespace, .. }
      | SocketPacket::Disconnect { namespace }
      | SocketPacket::Event { namespace, .. }
      | SocketPacket::Ack { namespace, .. }
      | SocketPacket::ConnectError { namespace, .. } => namespace,
    }
  }

  pub fn decode(raw: &str) -> Result<Self> {
    let kind = raw
      .chars()
      .next()
      .ok_or_else(|| Error::Protocol("empty socket packet".into()))?;
    let mut rest = &raw[kind.len_utf8()..];

    let namespace = if rest.starts_with('/') {
      let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
      rest = tail;
      ns.to_string()
    } else {
      "/".to_string()
    };

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let ack_id = rest[..digits].parse::<u64>().ok();
    rest = &rest[digits..];

    let data = if rest.is_empty() {
      None
    } else {
      Some(serde_json::from_str::<Value>(rest)?)
    };

    Ok(match kind {
      '0' => SocketPacket::Connect { namespace, data },
      '1' => SocketPacket::Disconnect { namespace },
      '2' => {
        let Some(Value::Array(mut args)) = data else {
          return Err(Error::Protocol(format!("event packet without arguments: {raw:?}")));
        };
        if args.is_empty() {
          return Err(Error::Protocol("event packet without a name".into()));
        }
        let Value::String(name) = args.remove(0) else {
          return Err(Error::Protocol(format!("event name is not a string: {raw:?}")));
        };
        let payload = args.into_iter().next().unwrap_or(Value::Null);
        SocketPacket::Event { namespace, name, payload }
      }
      '3' => SocketPacket::Ack {
        namespace,
        id: ack_id.ok_or_else(|| Error::Protocol("ack without id".into()))?,
      },
      '4' => SocketPacket::ConnectError { namespace, data },
      '5' | '6' => return Err(Error::Protocol("binary socket packets are not supported".into())),
      other => return Err(Error::Protocol(format!("unknown socket packet type {other:?}"))),
    })
  }

  pub fn encode(&self) -> String {
    let (kind, data) = match self {
      SocketPacket::Connect { data, .. } => ('0', data.clone()),
      SocketPacket::Disconnect { .. } => ('1', None),
      SocketPacket::Event { name, payload, .. } => {
        ('2', Some(Value::Array(vec![Value::String(name.clone()), payload.clone()])))
      }
      SocketPacket::Ack { id, .. } => return format!("3{}{id}[]", ns_prefix(self.namespace())),
      SocketPacket::ConnectError { data, .. } => ('4', data.clone()),
    };
    let data = data.map(|d| d.to_string()).unwrap_or_default();
    format!("{kind}{}{data}", ns_prefix(self.namespace()))
  }
}

/// `"/nari,"` for a custom namespace, nothing for the root one.
fn ns_prefix(namespace: &str) -> String {
  if namespace == "/" { String::new() } else { format!("{namespace},") }
}
