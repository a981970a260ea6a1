// src/runtime/letter.rs

//! Letters: the messages delivered to a process's mailbox.
//!
//! `Body` is the crate-wide tagged union of every letter kind. Reply-bearing
//! kinds embed a [`ReplySlot`] so request/reply correlation is structural
//! rather than string-keyed; a kind a given process does not serve is a
//! defined error ([`crate::error::SigilError::UnexpectedMessage`]), never a
//! silent no-op.

use crate::runtime::process::ProcessId;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

/// Transform applied by a config UPDATE. Receives the current value
/// (`Value::Null` when the key is unset) and returns the replacement.
/// Letters never cross a process boundary, so closures ride along.
pub type Xform = Box<dyn FnOnce(Value) -> Value + Send>;

/// Broadcast topics. One per broadcasting actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
  Config,
  CurrentUser,
}

/// A single message delivered to a process's mailbox.
///
/// Letters for one process are processed strictly in FIFO order, one at a
/// time; `from` identifies the sending process when the sender is itself a
/// process (public API callers send with `from: None`).
pub struct Letter {
  pub from: Option<ProcessId>,
  pub body: Body,
}

/// Every letter kind exchanged between processes.
pub enum Body {
  // --- Config store operations ---
  ConfigPut {
    key: Option<String>,
    value: Value,
  },
  ConfigGet {
    key: Option<String>,
    fallback: Value,
    reply: ReplySlot,
  },
  ConfigUpdate {
    key: Option<String>,
    xform: Option<Xform>,
  },
  ConfigDelete {
    key: Option<String>,
  },
  ConfigWhere {
    pattern: Option<String>,
    reply: ReplySlot,
  },

  // --- Session store operations ---
  SessionMerge {
    patch: Value,
  },
  SessionReset,
  SessionSnapshot {
    reply: ReplySlot,
  },
  SessionParam {
    key: Option<String>,
    reply: ReplySlot,
  },

  // --- Pub/Sub ---
  /// Register `letter.from` as a subscriber of the receiving process.
  Subscribe,
  /// Remove `letter.from` from the subscriber set; unknown member is a no-op.
  Unsubscribe,
  /// Fan-out notification carrying a post-mutation snapshot.
  Updated {
    topic: Topic,
    data: Value,
  },

  // --- Lifecycle ---
  /// Universal signal to gracefully shut down a process loop.
  Exit,
}

impl Body {
  pub fn variant_name(&self) -> &'static str {
    match self {
      Body::ConfigPut { .. } => "ConfigPut",
      Body::ConfigGet { .. } => "ConfigGet",
      Body::ConfigUpdate { .. } => "ConfigUpdate",
      Body::ConfigDelete { .. } => "ConfigDelete",
      Body::ConfigWhere { .. } => "ConfigWhere",
      Body::SessionMerge { .. } => "SessionMerge",
      Body::SessionReset => "SessionReset",
      Body::SessionSnapshot { .. } => "SessionSnapshot",
      Body::SessionParam { .. } => "SessionParam",
      Body::Subscribe => "Subscribe",
      Body::Unsubscribe => "Unsubscribe",
      Body::Updated { .. } => "Updated",
      Body::Exit => "Exit",
    }
  }
}

impl fmt::Debug for Body {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Payloads may hold closures and reply senders; the variant name is
    // what logging needs.
    f.write_str(self.variant_name())
  }
}

impl fmt::Debug for Letter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Letter")
      .field("from", &self.from)
      .field("body", &self.body.variant_name())
      .finish()
  }
}

/// A cloneable wrapper around a `tokio::sync::oneshot::Sender` that ensures
/// the underlying sender can only be used once.
///
/// The first `reply` wins; subsequent replies are no-ops returning `false`.
/// Dropping an unreplied slot closes the channel, which the waiting caller
/// observes as a timeout (or `MailboxClosed` for indefinite waits).
#[derive(Debug, Clone)]
pub struct ReplySlot {
  inner: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
}

impl ReplySlot {
  pub fn new(sender: oneshot::Sender<Value>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Some(sender))),
    }
  }

  /// Attempts to take the underlying sender and reply with `value`.
  ///
  /// Returns `true` if this call performed the reply (regardless of whether
  /// the requesting side was still waiting), `false` if a reply was already
  /// sent through this slot.
  pub async fn reply(&self, value: Value) -> bool {
    let mut guard = self.inner.lock().await;
    if let Some(sender) = guard.take() {
      // A dropped receiver just means the requester gave up waiting.
      let _ = sender.send(value);
      true
    } else {
      false
    }
  }
}
