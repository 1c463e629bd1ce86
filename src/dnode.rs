//! Outbound requests to storage nodes.
//!
//! Delivery is fire-and-forget: a transport never blocks the caller and never
//! reports a failed send back to it.

use crate::mgmt::Vgroup;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::net::Ipv4Addr;
use tracing::{trace, warn};

/// Storage-node addresses serving one vgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpSet {
  pub ips: Vec<Ipv4Addr>,
  pub port: u16,
  /// Index of the replica to try first.
  pub in_use: usize,
}

impl IpSet {
  pub fn from_vgroup(vgroup: &Vgroup, port: u16) -> Self {
    Self {
      ips: vgroup.vnodes.iter().map(|gid| gid.ip).collect(),
      port,
      in_use: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnodeRequest {
  CreateTable { target: IpSet, payload: Vec<u8> },
  RemoveTable { target: IpSet, payload: Vec<u8> },
}

impl DnodeRequest {
  pub fn target(&self) -> &IpSet {
    match self {
      DnodeRequest::CreateTable { target, .. } | DnodeRequest::RemoveTable { target, .. } => target,
    }
  }

  pub fn payload(&self) -> &[u8] {
    match self {
      DnodeRequest::CreateTable { payload, .. } | DnodeRequest::RemoveTable { payload, .. } => {
        payload
      }
    }
  }
}

pub trait DnodeTransport: Send + Sync {
  fn send_create_table(&self, target: &IpSet, payload: Vec<u8>);

  fn send_remove_table(&self, target: &IpSet, payload: Vec<u8>);
}

/// Queues requests for a separate delivery loop.
pub struct ChannelTransport {
  tx: Sender<DnodeRequest>,
}

impl ChannelTransport {
  /// Create a transport with a queue of `capacity` requests and the receiving
  /// end the delivery loop drains.
  pub fn new(capacity: usize) -> (Self, Receiver<DnodeRequest>) {
    let (tx, rx) = bounded(capacity);
    (Self { tx }, rx)
  }

  fn enqueue(&self, request: DnodeRequest) {
    let len = request.payload().len();
    match self.tx.try_send(request) {
      Ok(()) => trace!(bytes = len, "dnode request queued"),
      Err(TrySendError::Full(request)) => {
        warn!(
          bytes = len,
          target = ?request.target().ips,
          "dnode queue full, request dropped"
        );
      }
      Err(TrySendError::Disconnected(_)) => {
        warn!(bytes = len, "dnode queue closed, request dropped");
      }
    }
  }
}

impl DnodeTransport for ChannelTransport {
  fn send_create_table(&self, target: &IpSet, payload: Vec<u8>) {
    self.enqueue(DnodeRequest::CreateTable {
      target: target.clone(),
      payload,
    });
  }

  fn send_remove_table(&self, target: &IpSet, payload: Vec<u8>) {
    self.enqueue(DnodeRequest::RemoveTable {
      target: target.clone(),
      payload,
    });
  }
}
