//! Socket.IO over Engine.IO v4 HTTP long-polling.
//!
//! Handshake with `GET /socket.io/?EIO=4&transport=polling`, join the
//! namespace by posting `40/nari,`, then long-poll with `GET ...&sid=...`.
//! Pings from the server are answered with pongs on the next POST.

use std::{collections::VecDeque, future::Future, time::Duration};

use reqwest::{Client, Url, header::CONTENT_TYPE};
use tracing::{debug, info, warn};

use super::{
  EventChannel, RawEvent,
  packet::{EnginePacket, SocketPacket, decode_payload, encode_payload},
};
use crate::{Error, Result, config::ClientConfig};

#[derive(Debug)]
struct Session {
  sid:          String,
  /// A long-poll may legitimately hang for a full ping cycle.
  poll_timeout: Duration,
  joined:       bool,
}

#[derive(Debug)]
pub struct PollingChannel {
  http:            Client,
  endpoint:        Url,
  namespace:       String,
  request_timeout: Duration,
  session:         Option<Session>,
  pending:         VecDeque<RawEvent>,
}

impl PollingChannel {
  pub fn new(config: &ClientConfig) -> Result<Self> {
    let mut endpoint = Url::parse(&config.base_url)
      .ok()
      .filter(|url| !url.cannot_be_a_base())
      .ok_or_else(|| Error::InvalidBaseUrl(config.base_url.clone()))?;
    if let Ok(mut path) = endpoint.path_segments_mut() {
      path.pop_if_empty().push("socket.io").push("");
    }
    Ok(Self {
      http: Client::builder().build()?,
      endpoint,
      namespace: config.namespace.clone(),
      request_timeout: config.request_timeout(),
      session: None,
      pending: VecDeque::new(),
    })
  }

  fn url(&self, sid: Option<&str>) -> Url {
    let mut url = self.endpoint.clone();
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("EIO", "4").append_pair("transport", "polling");
      if let Some(sid) = sid {
        query.append_pair("sid", sid);
      }
    }
    url
  }

  fn session(&self) -> Result<&Session> {
    self.session.as_ref().ok_or(Error::ChannelClosed)
  }

  async fn get(&self, sid: Option<&str>, timeout: Duration) -> Result<String> {
    let resp = self
      .http
      .get(self.url(sid))
      .timeout(timeout)
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status {
        method: reqwest::Method::GET,
        path: self.endpoint.path().to_string(),
        status,
      });
    }
    Ok(resp.text().await?)
  }

  async fn post(&self, packets: &[EnginePacket]) -> Result<()> {
    let sid = self.session()?.sid.clone();
    let resp = self
      .http
      .post(self.url(Some(&sid)))
      .timeout(self.request_timeout)
      .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
      .body(encode_payload(packets))
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status {
        method: reqwest::Method::POST,
        path: self.endpoint.path().to_string(),
        status,
      });
    }
    Ok(())
  }

  /// Fold one polling response into the session. Returns the packets to
  /// send back (pongs).
  fn absorb(&mut self, packets: Vec<EnginePacket>) -> Result<Vec<EnginePacket>> {
    let mut replies = Vec::new();
    for packet in packets {
      match packet {
        EnginePacket::Ping => replies.push(EnginePacket::Pong),
        EnginePacket::Close => return Err(Error::ChannelClosed),
        EnginePacket::Message(raw) => match SocketPacket::decode(&raw) {
          Ok(packet) if packet.namespace() != self.namespace => {
            debug!(namespace = packet.namespace(), "ignoring packet for other namespace");
          }
          Ok(SocketPacket::Event { name, payload, .. }) => {
            self.pending.push_back(RawEvent { name, payload });
          }
          Ok(SocketPacket::Connect { .. }) => {
            if let Some(session) = self.session.as_mut() {
              session.joined = true;
            }
          }
          Ok(SocketPacket::ConnectError { data, .. }) => {
            return Err(Error::ConnectRefused {
              namespace: self.namespace.clone(),
              reason:    data.map(|d| d.to_string()).unwrap_or_default(),
            });
          }
          Ok(SocketPacket::Disconnect { .. }) => return Err(Error::ChannelClosed),
          Ok(SocketPacket::Ack { .. }) => {}
          Err(error) => warn!(%error, "dropping undecodable socket packet"),
        },
        EnginePacket::Open(_) | EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => {}
      }
    }
    Ok(replies)
  }

  async fn poll_once(&mut self) -> Result<()> {
    let (sid, timeout) = {
      let session = self.session()?;
      (session.sid.clone(), session.poll_timeout)
    };
    let body = self.get(Some(&sid), timeout).await?;
    let replies = self.absorb(decode_payload(&body))?;
    if !replies.is_empty() {
      self.post(&replies).await?;
    }
    Ok(())
  }

  async fn open(&mut self) -> Result<()> {
    self.session = None;
    self.pending.clear();

    let body = self.get(None, self.request_timeout).await?;
    let handshake = match decode_payload(&body).into_iter().next() {
      Some(EnginePacket::Open(handshake)) => handshake,
      other => {
        return Err(Error::Protocol(format!("expected open packet, got {other:?}")));
      }
    };
    debug!(sid = %handshake.sid, "engine.io handshake");
    self.session = Some(Session {
      sid:          handshake.sid,
      poll_timeout: Duration::from_millis(
        handshake.ping_interval + handshake.ping_timeout,
      ),
      joined:       false,
    });

    let join = SocketPacket::Connect { namespace: self.namespace.clone(), data: None };
    self.post(&[EnginePacket::Message(join.encode())]).await?;
    while !self.session()?.joined {
      self.poll_once().await?;
    }
    info!(namespace = %self.namespace, "joined event namespace");
    Ok(())
  }

  async fn next(&mut self) -> Result<RawEvent> {
    loop {
      if let Some(event) = self.pending.pop_front() {
        return Ok(event);
      }
      if let Err(error) = self.poll_once().await {
        self.session = None;
        return Err(error);
      }
    }
  }

  async fn shut(&mut self) {
    if self.session.is_none() {
      return;
    }
    let leave = SocketPacket::Disconnect { namespace: self.namespace.clone() };
    let packets = [EnginePacket::Message(leave.encode()), EnginePacket::Close];
    if let Err(error) = self.post(&packets).await {
      debug!(%error, "close notification failed");
    }
    self.session = None;
    self.pending.clear();
  }
}

impl EventChannel for PollingChannel {
  fn connect(&mut self) -> impl Future<Output = Result<()>> + Send + '_ {
    self.open()
  }

  fn next_event(&mut self) -> impl Future<Output = Result<RawEvent>> + Send + '_ {
    self.next()
  }

  fn close(&mut self) -> impl Future<Output = ()> + Send + '_ { self.shut() }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
  };

  use axum::{
    Router,
    extract::{Query, State},
    routing::get,
  };

  use super::*;
  use crate::tests::serve;

  const OPEN: &str = "0{\"sid\":\"s1\",\"upgrades\":[],\"pingInterval\":300,\"pingTimeout\":200}";

  /// A scripted Engine.IO server: each long-poll pops the next body.
  #[derive(Clone, Default)]
  struct MockEio {
    polls:  Arc<Mutex<VecDeque<&'static str>>>,
    posted: Arc<Mutex<Vec<String>>>,
  }

  impl MockEio {
    fn new(polls: &[&'static str]) -> Self {
      let mock = Self::default();
      mock.polls.lock().unwrap().extend(polls);
      mock
    }

    fn router(&self) -> Router {
      Router::new()
        .route("/socket.io/", get(poll).post(receive))
        .with_state(self.clone())
    }

    fn posted(&self) -> Vec<String> { self.posted.lock().unwrap().clone() }
  }

  async fn poll(
    State(mock): State<MockEio>,
    Query(query): Query<HashMap<String, String>>,
  ) -> String {
    if !query.contains_key("sid") {
      return OPEN.to_string();
    }
    let next = mock.polls.lock().unwrap().pop_front();
    match next {
      Some(body) => body.to_string(),
      None => {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "6".to_string()
      }
    }
  }

  async fn receive(State(mock): State<MockEio>, body: String) -> &'static str {
    mock.posted.lock().unwrap().push(body);
    "ok"
  }

  async fn channel_for(mock: &MockEio) -> PollingChannel {
    let base_url = serve(mock.router()).await;
    PollingChannel::new(&ClientConfig { base_url, ..Default::default() }).unwrap()
  }

  #[tokio::test]
  async fn joins_namespace_then_yields_events() {
    let mock = MockEio::new(&[
      "40/nari,{\"sid\":\"n1\"}",
      "2\x1e42/nari,[\"task_added\",{\"id\":1,\"title\":\"A\"}]\x1e42[\"other\",{}]",
      "41/nari,",
    ]);
    let mut channel = channel_for(&mock).await;

    channel.connect().await.unwrap();
    let event = channel.next_event().await.unwrap();
    assert_eq!(event.name, "task_added");
    assert_eq!(event.payload["id"], 1);

    // The namespace disconnect ends the stream.
    assert!(matches!(channel.next_event().await, Err(Error::ChannelClosed)));

    let posted = mock.posted();
    assert_eq!(posted[0], "40/nari,");
    assert_eq!(posted[1], "3");
  }

  #[tokio::test]
  async fn refused_namespace_fails_the_connect() {
    let mock = MockEio::new(&["44/nari,{\"message\":\"Invalid namespace\"}"]);
    let mut channel = channel_for(&mock).await;
    let err = channel.connect().await.unwrap_err();
    assert!(matches!(err, Error::ConnectRefused { .. }));
  }

  #[tokio::test]
  async fn unreachable_backend_fails_the_connect() {
    let mut channel = PollingChannel::new(&ClientConfig {
      base_url: "http://127.0.0.1:9".into(),
      request_timeout_secs: 1,
      ..Default::default()
    })
    .unwrap();
    assert!(channel.connect().await.is_err());
    channel.close().await;
  }
}
