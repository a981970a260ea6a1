// src/authz/http_post.rs

//! Request/poll strategy: submit the signable over HTTP, then poll an
//! update endpoint until the provider reaches a terminal state.

use crate::authz::poll::{poll_for_updates, PollSession};
use crate::authz::response::{self, Status};
use crate::authz::{url_from_service, Authz};
use crate::client::Services;
use crate::error::SigilError;
use crate::surface::{msg, FrameHandle};
use crate::transport::HttpRequest;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

pub(crate) async fn exec_http_post(
  services: &Services,
  authz: &Authz,
  signable: &Value,
) -> Result<Value, SigilError> {
  // The provider's opaque service data rides along with the signable.
  let mut payload = signable.clone();
  if let Value::Object(map) = &mut payload {
    if !authz.data.is_null() {
      map.insert("data".to_string(), authz.data.clone());
    }
  }

  let url = url_from_service(&authz.endpoint, &authz.params)?;
  let raw = services
    .http
    .fetch(HttpRequest::post(url, Some(payload)))
    .await?;
  let resp = response::normalize(&raw)?;

  match resp.status {
    Status::Approved => Ok(resp.data),
    Status::Declined => Err(SigilError::Declined {
      reason: resp.reason_or_default(),
    }),
    Status::Pending => {
      let updates = resp.updates.ok_or_else(|| {
        SigilError::MalformedResponse("PENDING response without an update endpoint".to_string())
      })?;

      let handle = match resp.local.first() {
        Some(frame) => services.surface.render(frame)?,
        None => FrameHandle::noop(),
      };

      // The user closing the provider view halts the poll session; the
      // watcher also performs the unmount so nothing stays mounted while
      // the final poll round-trip unwinds.
      let session = PollSession::new();
      let mut inbound = services.port.subscribe();
      let watcher_session = session.clone();
      let watcher_handle = handle.clone();
      let watcher = tokio::spawn(async move {
        loop {
          match inbound.recv().await {
            Ok(message) => {
              if message.get(msg::TYPE_FIELD).and_then(Value::as_str) == Some(msg::VIEW_CLOSE) {
                tracing::debug!("Provider view closed by user; halting poll session");
                watcher_session.halt();
                watcher_handle.unmount();
                return;
              }
            }
            Err(RecvError::Lagged(skipped)) => {
              tracing::warn!(skipped, "View watcher lagged behind the message port");
            }
            Err(RecvError::Closed) => return,
          }
        }
      });

      let result = poll_for_updates(services, &updates, &session).await;
      watcher.abort();
      // Idempotent: a no-op when the watcher already tore the frame down.
      handle.unmount();
      result
    }
    other => {
      tracing::error!(status = %other, endpoint = %authz.endpoint, "Auto decline: invalid response");
      Err(SigilError::AutoDecline(other.to_string()))
    }
  }
}
