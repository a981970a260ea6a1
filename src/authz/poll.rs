// src/authz/poll.rs

//! Poll-until-terminal with cooperative cancellation.

use crate::authz::response::{self, ServiceRef, Status};
use crate::authz::url_from_service;
use crate::client::Services;
use crate::error::SigilError;
use crate::transport::HttpRequest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ties a polling loop to a "may continue" flag. Flipping the flag via
/// [`PollSession::halt`] stops the loop before its next attempt; no further
/// poll request is issued after that.
#[derive(Debug, Clone)]
pub struct PollSession {
  can_continue: Arc<AtomicBool>,
}

impl PollSession {
  pub fn new() -> Self {
    Self {
      can_continue: Arc::new(AtomicBool::new(true)),
    }
  }

  pub fn may_continue(&self) -> bool {
    self.can_continue.load(Ordering::Acquire)
  }

  /// Cooperative cancel; safe from any task, any number of times.
  pub fn halt(&self) {
    self.can_continue.store(false, Ordering::Release);
  }
}

impl Default for PollSession {
  fn default() -> Self {
    Self::new()
  }
}

/// Polls `updates` until a terminal status arrives or `session` is halted.
///
/// `APPROVED` resolves with the response data and `DECLINED` fails with the
/// supplied reason; any non-terminal status waits out the poll interval and
/// tries again. A halted session resolves as a decline with the protocol's
/// "Externally Halted" wording.
pub async fn poll_for_updates(
  services: &Services,
  updates: &ServiceRef,
  session: &PollSession,
) -> Result<serde_json::Value, SigilError> {
  let url = url_from_service(&updates.endpoint, &updates.params)?;
  let mut attempt: u32 = 0;

  loop {
    if !session.may_continue() {
      tracing::debug!(url = %url, attempt, "Polling halted externally");
      return Err(SigilError::Declined {
        reason: "Externally Halted".to_string(),
      });
    }

    attempt += 1;
    let raw = services.http.fetch(HttpRequest::get(url.clone())).await?;
    let resp = response::normalize(&raw)?;
    tracing::trace!(url = %url, attempt, status = %resp.status, "Poll attempt");

    match resp.status {
      Status::Approved => return Ok(resp.data),
      Status::Declined => {
        return Err(SigilError::Declined {
          reason: resp.reason_or_default(),
        })
      }
      _ => tokio::time::sleep(services.authz.poll_interval).await,
    }
  }
}
