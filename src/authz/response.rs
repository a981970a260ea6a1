// src/authz/response.rs

//! Polling-response normalization.
//!
//! Wallet providers answer every protocol step with a versioned
//! `PollingResponse` envelope. Normalization is lenient about shape (older
//! providers use `authorizationUpdates` for the update endpoint) but strict
//! about meaning: an unrecognized status stays unrecognized so strategies
//! can fail closed.

use crate::error::SigilError;
use crate::surface::FrameTarget;

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

pub const F_TYPE: &str = "PollingResponse";
pub const F_VSN: &str = "1.0.0";

/// Provider-reported status of an authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  Approved,
  Declined,
  Pending,
  Redirect,
  Other(String),
}

impl Status {
  pub fn parse(raw: &str) -> Self {
    match raw {
      "APPROVED" => Status::Approved,
      "DECLINED" => Status::Declined,
      "PENDING" => Status::Pending,
      "REDIRECT" => Status::Redirect,
      other => Status::Other(other.to_string()),
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::Approved => f.write_str("APPROVED"),
      Status::Declined => f.write_str("DECLINED"),
      Status::Pending => f.write_str("PENDING"),
      Status::Redirect => f.write_str("REDIRECT"),
      Status::Other(raw) => f.write_str(raw),
    }
  }
}

/// Pointer to a follow-up service (the update endpoint of a pending
/// authorization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
  pub endpoint: String,
  pub params: HashMap<String, String>,
}

/// A normalized provider response.
#[derive(Debug, Clone)]
pub struct PollingResponse {
  pub status: Status,
  pub reason: Option<String>,
  pub data: Value,
  /// Frames the provider asks the client to mount locally.
  pub local: Vec<FrameTarget>,
  /// Update endpoint to poll while the attempt is pending.
  pub updates: Option<ServiceRef>,
}

impl PollingResponse {
  /// The decline reason, or the protocol's stock wording.
  pub fn reason_or_default(&self) -> String {
    self
      .reason
      .clone()
      .unwrap_or_else(|| "No reason supplied.".to_string())
  }
}

/// Normalizes a raw provider response.
///
/// A missing status normalizes to `Status::Other` so the caller fails
/// closed instead of guessing.
pub fn normalize(raw: &Value) -> Result<PollingResponse, SigilError> {
  let obj = raw
    .as_object()
    .ok_or_else(|| SigilError::MalformedResponse(format!("Provider response is not an object: {}", raw)))?;

  let status = match obj.get("status").and_then(Value::as_str) {
    Some(raw_status) => Status::parse(raw_status),
    None => Status::Other("<missing>".to_string()),
  };

  let reason = obj
    .get("reason")
    .and_then(Value::as_str)
    .map(str::to_string);

  let data = obj.get("data").cloned().unwrap_or(Value::Null);

  let local = match obj.get("local") {
    Some(Value::Array(frames)) => frames.iter().filter_map(parse_frame).collect(),
    Some(single @ Value::Object(_)) => parse_frame(single).into_iter().collect(),
    _ => Vec::new(),
  };

  let updates = obj
    .get("updates")
    .or_else(|| obj.get("authorizationUpdates"))
    .and_then(parse_service_ref);

  Ok(PollingResponse {
    status,
    reason,
    data,
    local,
    updates,
  })
}

fn parse_frame(raw: &Value) -> Option<FrameTarget> {
  let endpoint = raw.get("endpoint").and_then(Value::as_str)?;
  Some(FrameTarget {
    endpoint: endpoint.to_string(),
    params: parse_params(raw.get("params")),
  })
}

fn parse_service_ref(raw: &Value) -> Option<ServiceRef> {
  let endpoint = raw.get("endpoint").and_then(Value::as_str)?;
  Some(ServiceRef {
    endpoint: endpoint.to_string(),
    params: parse_params(raw.get("params")),
  })
}

/// Query params are rendered as display strings; non-string scalars are
/// stringified, structured values skipped.
fn parse_params(raw: Option<&Value>) -> HashMap<String, String> {
  let mut params = HashMap::new();
  if let Some(Value::Object(map)) = raw {
    for (key, value) in map {
      match value {
        Value::String(s) => {
          params.insert(key.clone(), s.clone());
        }
        Value::Number(n) => {
          params.insert(key.clone(), n.to_string());
        }
        Value::Bool(b) => {
          params.insert(key.clone(), b.to_string());
        }
        _ => {
          tracing::trace!(key = %key, "Skipping non-scalar service param");
        }
      }
    }
  }
  params
}
