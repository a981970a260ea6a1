// src/authz/frame_rpc.rs

//! Interactive-channel strategy: mount a provider frame and exchange one
//! correlated JSON-RPC sign request/response with it.

use crate::authz::{random_id, Authz};
use crate::client::Services;
use crate::error::SigilError;
use crate::surface::{msg, FrameTarget};

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

pub const JSONRPC_VERSION: &str = "2.0";
pub const SIGN_METHOD: &str = "sigil:sign";

pub(crate) async fn exec_frame_rpc(
  services: &Services,
  authz: &Authz,
  signable: &Value,
) -> Result<Value, SigilError> {
  // Subscribe before mounting so nothing the frame posts is missed.
  let mut inbound = services.port.subscribe();

  let frame = FrameTarget {
    endpoint: authz.endpoint.clone(),
    params: authz.params.clone(),
  };
  let handle = services.surface.render(&frame)?;

  // The frame is torn down exactly once on every exit path.
  let result = drive_handshake(services, authz, signable, &mut inbound).await;
  handle.unmount();
  result
}

async fn drive_handshake(
  services: &Services,
  authz: &Authz,
  signable: &Value,
  inbound: &mut Receiver<Value>,
) -> Result<Value, SigilError> {
  let id = random_id();

  // Ready race: probe the frame, then wait a bounded window for its ready
  // signal. Whichever side wins, the sign request is posted exactly once.
  services.port.post(json!({ "type": msg::VIEW_READY }))?;
  let ready_deadline = tokio::time::sleep(services.authz.ready_timeout);
  tokio::pin!(ready_deadline);
  loop {
    tokio::select! {
      _ = &mut ready_deadline => {
        tracing::debug!(id = %id, "Ready window elapsed; posting sign request unconditionally");
        break;
      }
      received = inbound.recv() => match received {
        Ok(message) => {
          if message.get(msg::TYPE_FIELD).and_then(Value::as_str) == Some(msg::AUTHZ_READY) {
            tracing::debug!(id = %id, "Provider frame ready");
            break;
          }
          // Stray message; keep waiting.
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(id = %id, skipped, "Handshake lagged behind the message port");
        }
        Err(RecvError::Closed) => return Err(SigilError::MailboxClosed),
      },
    }
  }

  services.port.post(json!({
    "jsonrpc": JSONRPC_VERSION,
    "id": id,
    "method": SIGN_METHOD,
    "params": [signable, authz.params],
  }))?;

  // Exactly one correlated response settles the attempt; every malformed or
  // mismatched message is silently ignored.
  let expected_id = Value::String(id.clone());
  loop {
    let message = match inbound.recv().await {
      Ok(message) => message,
      Err(RecvError::Lagged(skipped)) => {
        tracing::warn!(id = %id, skipped, "Response wait lagged behind the message port");
        continue;
      }
      Err(RecvError::Closed) => return Err(SigilError::MailboxClosed),
    };

    let Some(obj) = message.as_object() else { continue };
    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
      continue;
    }
    if obj.get("id") != Some(&expected_id) {
      continue;
    }
    let Some(result) = obj.get("result") else { continue };

    return match result.get("status").and_then(Value::as_str) {
      Some("APPROVED") => Ok(result.get("compositeSignature").cloned().unwrap_or(Value::Null)),
      Some("DECLINED") => Err(SigilError::Declined {
        reason: result
          .get("reason")
          .and_then(Value::as_str)
          .unwrap_or("No reason supplied.")
          .to_string(),
      }),
      _ => Err(SigilError::Declined {
        reason: "Status was neither APPROVED nor DECLINED".to_string(),
      }),
    };
  }
}
