// src/wallet.rs

//! Provider-side helpers: the other half of the message-port contract.
//!
//! A wallet surface embedded in the same process (or a test standing in for
//! one) answers the protocol with these. Responses travel as versioned
//! `PollingResponse` envelopes; sign replies as correlated JSON-RPC frames.

use crate::authz::frame_rpc::JSONRPC_VERSION;
use crate::authz::response::{F_TYPE, F_VSN};
use crate::error::SigilError;
use crate::surface::{msg, MessagePort};

use serde_json::{json, Value};

fn polling_response(status: &str, reason: Option<&str>, data: Value) -> Value {
  json!({
    "type": msg::VIEW_RESPONSE,
    "f_type": F_TYPE,
    "f_vsn": F_VSN,
    "status": status,
    "reason": reason,
    "data": data,
  })
}

/// Announces that the provider view is ready to receive the sign request.
pub fn ready(port: &dyn MessagePort) -> Result<(), SigilError> {
  port.post(json!({ "type": msg::AUTHZ_READY }))
}

/// Announces that the user closed the provider view.
pub fn close(port: &dyn MessagePort) -> Result<(), SigilError> {
  port.post(json!({ "type": msg::VIEW_CLOSE }))
}

pub fn approve(port: &dyn MessagePort, data: Value) -> Result<(), SigilError> {
  port.post(polling_response("APPROVED", None, data))
}

pub fn decline(port: &dyn MessagePort, reason: &str) -> Result<(), SigilError> {
  port.post(polling_response("DECLINED", Some(reason), Value::Null))
}

pub fn redirect(port: &dyn MessagePort, data: Value) -> Result<(), SigilError> {
  port.post(polling_response("REDIRECT", None, data))
}

/// Approves a correlated sign request with a composite signature payload.
pub fn approve_sign(
  port: &dyn MessagePort,
  id: &str,
  composite_signature: Value,
) -> Result<(), SigilError> {
  port.post(json!({
    "jsonrpc": JSONRPC_VERSION,
    "id": id,
    "result": { "status": "APPROVED", "compositeSignature": composite_signature },
  }))
}

/// Declines a correlated sign request.
pub fn decline_sign(port: &dyn MessagePort, id: &str, reason: &str) -> Result<(), SigilError> {
  port.post(json!({
    "jsonrpc": JSONRPC_VERSION,
    "id": id,
    "result": { "status": "DECLINED", "reason": reason },
  }))
}
