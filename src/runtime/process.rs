// src/runtime/process.rs

//! Processes: isolated, serially-processing units of state.
//!
//! A process owns its mailbox and its state; nothing else ever touches that
//! state directly. The letter loop handles exactly one letter at a time in
//! arrival order, so a handler never races another handler of the same
//! process. Handler errors are caught per letter: the loop logs and moves on
//! to the next letter.

use crate::context::Context;
use crate::error::SigilError;
use crate::runtime::letter::{Body, Letter, Topic};
use crate::runtime::mailbox::MailboxReceiver;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

/// Opaque identifier of a process within one [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub(crate) usize);

impl fmt::Display for ProcessId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "process-{}", self.0)
  }
}

/// Behavior of a letter-loop process. The runtime drives the loop; the
/// processor only sees one letter at a time.
#[async_trait]
pub trait Processor: Send + 'static {
  /// Runs once before the first letter is handled.
  async fn init(&mut self, _ctx: &mut ActorContext) -> Result<(), SigilError> {
    Ok(())
  }

  /// Handles a single letter. An `Err` fails this letter only.
  async fn handle(&mut self, ctx: &mut ActorContext, letter: Letter) -> Result<(), SigilError>;
}

/// The execution context handed to a process: its mailbox receiver, its
/// subscriber set, and a handle back into the runtime for sending.
pub struct ActorContext {
  pid: ProcessId,
  context: Context,
  receiver: MailboxReceiver,
  subscribers: HashSet<ProcessId>,
}

impl ActorContext {
  pub(crate) fn new(pid: ProcessId, context: Context, receiver: MailboxReceiver) -> Self {
    Self {
      pid,
      context,
      receiver,
      subscribers: HashSet::new(),
    }
  }

  pub fn pid(&self) -> ProcessId {
    self.pid
  }

  pub fn context(&self) -> &Context {
    &self.context
  }

  /// Awaits the next letter. Suspends only this process.
  pub async fn receive(&mut self) -> Result<Letter, SigilError> {
    self.receiver.recv().await.map_err(|_| SigilError::MailboxClosed)
  }

  /// Sends a letter stamped with this process as the sender.
  pub async fn send(
    &self,
    target: impl Into<crate::context::Target>,
    body: Body,
  ) -> Result<(), SigilError> {
    self.context.send_from(Some(self.pid), target, body).await
  }

  /// Adds `pid` to the subscriber set. Subscribing twice is subscribing once.
  pub fn subscribe(&mut self, pid: ProcessId) {
    if self.subscribers.insert(pid) {
      tracing::trace!(process = %self.pid, subscriber = %pid, "Subscriber added");
    }
  }

  /// Removes `pid` from the subscriber set. Unknown member is a no-op.
  pub fn unsubscribe(&mut self, pid: ProcessId) {
    if self.subscribers.remove(&pid) {
      tracing::trace!(process = %self.pid, subscriber = %pid, "Subscriber removed");
    }
  }

  /// Fans `Updated { topic, data }` out to every current subscriber.
  ///
  /// The subscriber set is snapshotted before iterating, so a subscriber
  /// unsubscribing as a side effect of the broadcast cannot corrupt the
  /// iteration. Delivery is at-most-once per subscriber; a dead subscriber
  /// is logged and skipped without affecting the others.
  pub async fn broadcast(&self, topic: Topic, data: Value) {
    let targets: Vec<ProcessId> = self.subscribers.iter().copied().collect();
    tracing::trace!(process = %self.pid, topic = ?topic, count = targets.len(), "Broadcasting");
    for target in targets {
      let body = Body::Updated {
        topic,
        data: data.clone(),
      };
      if let Err(e) = self.context.send_from(Some(self.pid), target, body).await {
        tracing::warn!(
          process = %self.pid,
          subscriber = %target,
          error = %e,
          "Broadcast delivery failed; continuing with remaining subscribers"
        );
      }
    }
  }
}

/// Drives a [`Processor`] until its mailbox closes or an `Exit` letter
/// arrives, then unregisters the process from the context.
pub(crate) async fn run_letter_loop<P: Processor>(mut processor: P, mut actx: ActorContext) {
  let pid = actx.pid();
  let context = actx.context().clone();

  if let Err(e) = processor.init(&mut actx).await {
    tracing::error!(pid = %pid, error = %e, "Process init failed");
    context.unregister(pid).await;
    return;
  }
  tracing::debug!(pid = %pid, "Process entering letter loop");

  loop {
    let letter = match actx.receive().await {
      Ok(letter) => letter,
      Err(_) => break, // mailbox closed
    };
    if matches!(letter.body, Body::Exit) {
      tracing::debug!(pid = %pid, "Process received Exit");
      break;
    }
    let tag = letter.body.variant_name();
    if let Err(e) = processor.handle(&mut actx, letter).await {
      // Per-letter failure isolation: state stays consistent, loop continues.
      tracing::error!(pid = %pid, tag = tag, error = %e, "Letter handler failed");
    }
  }

  context.unregister(pid).await;
  tracing::debug!(pid = %pid, "Process loop ended");
}
