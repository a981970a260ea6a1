// src/subscription.rs

//! Unsubscribe handles returned by `subscribe` calls.

use crate::context::Context;
use crate::runtime::letter::Body;
use crate::runtime::process::ProcessId;

/// Handle to a subscriber helper process. Dropping it does NOT unsubscribe;
/// call [`Subscription::unsubscribe`], which is safe to invoke more than
/// once (later calls find the helper already gone and do nothing).
#[derive(Debug, Clone)]
pub struct Subscription {
  ctx: Context,
  pid: ProcessId,
}

impl Subscription {
  pub(crate) fn new(ctx: Context, pid: ProcessId) -> Self {
    Self { ctx, pid }
  }

  /// Stops the subscriber helper, which deregisters itself from the
  /// broadcasting actor on the way out.
  pub async fn unsubscribe(&self) {
    if let Err(e) = self.ctx.send(self.pid, Body::Exit).await {
      tracing::trace!(pid = %self.pid, error = %e, "Unsubscribe on finished subscriber");
    }
  }
}
