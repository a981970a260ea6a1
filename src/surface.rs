// src/surface.rs

//! Rendering-surface and cross-surface messaging collaborators.
//!
//! The protocol core mounts provider UI through [`Surface`] and exchanges
//! postable JSON messages with it through [`MessagePort`]. Both are narrow
//! contracts; the library never looks inside a rendered frame.

use crate::error::SigilError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;

/// Message `type` values exchanged over a [`MessagePort`].
pub mod msg {
  pub const TYPE_FIELD: &str = "type";
  pub const CHALLENGE_RESPONSE: &str = "SIGIL::CHALLENGE::RESPONSE";
  pub const AUTHZ_READY: &str = "SIGIL::AUTHZ_READY";
  pub const VIEW_READY: &str = "SIGIL::VIEW::READY";
  pub const VIEW_READY_RESPONSE: &str = "SIGIL::VIEW::READY::RESPONSE";
  pub const VIEW_RESPONSE: &str = "SIGIL::VIEW::RESPONSE";
  pub const VIEW_CLOSE: &str = "SIGIL::VIEW::CLOSE";
}

/// What to render: an endpoint plus provider-supplied parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTarget {
  pub endpoint: String,
  pub params: HashMap<String, String>,
}

impl FrameTarget {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: endpoint.into(),
      params: HashMap::new(),
    }
  }
}

/// Handle to a mounted frame. `unmount` is safe to call any number of times;
/// only the first call tears the frame down.
#[derive(Clone)]
pub struct FrameHandle {
  // Take-once: the closure is consumed by the first unmount.
  inner: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl FrameHandle {
  pub fn new(unmount: impl FnOnce() + Send + 'static) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Some(Box::new(unmount)))),
    }
  }

  /// A handle with nothing to tear down.
  pub fn noop() -> Self {
    Self {
      inner: Arc::new(Mutex::new(None)),
    }
  }

  /// Tears the frame down. Returns `true` if this call performed the
  /// unmount, `false` if it had already happened.
  pub fn unmount(&self) -> bool {
    let taken = match self.inner.lock() {
      Ok(mut guard) => guard.take(),
      Err(poisoned) => poisoned.into_inner().take(),
    };
    match taken {
      Some(teardown) => {
        teardown();
        true
      }
      None => false,
    }
  }
}

impl std::fmt::Debug for FrameHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FrameHandle").finish_non_exhaustive()
  }
}

/// Mounts provider-supplied UI into the host's rendering surface.
pub trait Surface: Send + Sync {
  fn render(&self, frame: &FrameTarget) -> Result<FrameHandle, SigilError>;
}

/// Surface for hosts with nothing to render. Frames are not mounted; the
/// returned handle tears nothing down.
#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl Surface for HeadlessSurface {
  fn render(&self, frame: &FrameTarget) -> Result<FrameHandle, SigilError> {
    tracing::warn!(endpoint = %frame.endpoint, "No rendering surface wired in; frame not mounted");
    Ok(FrameHandle::noop())
  }
}

/// A postable-message channel to the provider surface. Correlation and
/// filtering are entirely the consumer's job; stray or malformed messages
/// must be ignored by every listener, never treated as errors.
pub trait MessagePort: Send + Sync {
  /// Posts a message toward the other side of the channel.
  fn post(&self, message: Value) -> Result<(), SigilError>;

  /// Subscribes to messages arriving from the other side. Each receiver
  /// sees every message posted after it subscribed.
  fn subscribe(&self) -> broadcast::Receiver<Value>;
}

const DEFAULT_PORT_CAPACITY: usize = 256;

/// Loopback port: the client half of an in-process message channel.
///
/// `wallet_side()` returns the mirrored half for the provider surface, which
/// is how tests and embedded wallets answer the protocol.
#[derive(Debug, Clone)]
pub struct ChannelPort {
  to_wallet: broadcast::Sender<Value>,
  to_client: broadcast::Sender<Value>,
}

impl ChannelPort {
  pub fn new() -> Self {
    let (to_wallet, _) = broadcast::channel(DEFAULT_PORT_CAPACITY);
    let (to_client, _) = broadcast::channel(DEFAULT_PORT_CAPACITY);
    Self {
      to_wallet,
      to_client,
    }
  }

  /// The provider-side view of this channel.
  pub fn wallet_side(&self) -> WalletPort {
    WalletPort {
      to_wallet: self.to_wallet.clone(),
      to_client: self.to_client.clone(),
    }
  }
}

impl Default for ChannelPort {
  fn default() -> Self {
    Self::new()
  }
}

impl MessagePort for ChannelPort {
  fn post(&self, message: Value) -> Result<(), SigilError> {
    tracing::trace!(?message, "Posting message to wallet side");
    // No receiver on the other side is not an error; the message is simply
    // not observed, matching at-most-once delivery.
    let _ = self.to_wallet.send(message);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<Value> {
    self.to_client.subscribe()
  }
}

/// The provider-side half of a [`ChannelPort`].
#[derive(Debug, Clone)]
pub struct WalletPort {
  to_wallet: broadcast::Sender<Value>,
  to_client: broadcast::Sender<Value>,
}

impl MessagePort for WalletPort {
  fn post(&self, message: Value) -> Result<(), SigilError> {
    tracing::trace!(?message, "Posting message to client side");
    let _ = self.to_client.send(message);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<Value> {
    self.to_wallet.subscribe()
  }
}
