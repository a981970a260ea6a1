// src/authz/mod.rs

//! Authorization protocol: strategy dispatch, polling-until-terminal,
//! cancellation, and composite-signature assembly.
//!
//! `exec` is the single entry point. It selects a strategy from the
//! descriptor's method, runs it, then normalizes and validates the raw
//! composite payload the strategy resolved with. Strategy errors are logged
//! with full context before they propagate; they are never swallowed.

pub mod frame_rpc;
pub mod http_post;
pub mod poll;
pub mod response;
pub mod signature;

use crate::client::Services;
use crate::error::SigilError;

use std::collections::HashMap;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub use signature::CompositeSignature;

/// How a signing request reaches the wallet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthzMethod {
  /// Submit the signable over HTTP and poll an update endpoint.
  #[serde(rename = "HTTP/POST")]
  HttpPost,
  /// Mount a provider frame and run a correlated JSON-RPC handshake.
  #[serde(rename = "IFRAME/RPC")]
  FrameRpc,
}

/// An authorization service descriptor: where and how to ask for a
/// signature. Stored in the session record and handed to [`exec`].
///
/// An unrecognized `method` string fails deserialization up front; there is
/// no fallback strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authz {
  pub method: AuthzMethod,
  pub endpoint: String,
  /// Expected signer address, when the provider pins one.
  #[serde(default)]
  pub addr: Option<String>,
  #[serde(rename = "keyId", default)]
  pub key_id: Option<u64>,
  #[serde(default)]
  pub params: HashMap<String, String>,
  /// Opaque provider data echoed back with the signable payload.
  #[serde(default)]
  pub data: Value,
}

/// Tunable timings of the protocol.
#[derive(Debug, Clone, Copy)]
pub struct AuthzOptions {
  /// Delay between poll attempts against an update endpoint.
  pub poll_interval: Duration,
  /// Bounded wait for the provider frame's ready signal before the sign
  /// request is posted unconditionally.
  pub ready_timeout: Duration,
}

impl Default for AuthzOptions {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(1),
      ready_timeout: Duration::from_secs(5),
    }
  }
}

/// Builds a service URL with every param appended as a query pair.
pub fn url_from_service(endpoint: &str, params: &HashMap<String, String>) -> Result<String, SigilError> {
  let mut url = Url::parse(endpoint)
    .map_err(|e| SigilError::MalformedResponse(format!("Invalid service endpoint {:?}: {}", endpoint, e)))?;
  if !params.is_empty() {
    let mut pairs = url.query_pairs_mut();
    for (key, value) in params {
      pairs.append_pair(key, value);
    }
  }
  Ok(url.into())
}

/// Random alphanumeric correlation id.
pub(crate) fn random_id() -> String {
  rand::rng()
    .sample_iter(&Alphanumeric)
    .take(10)
    .map(char::from)
    .collect()
}

/// Runs the authorization protocol for one descriptor and signable payload.
///
/// Resolves with a normalized, validated [`CompositeSignature`]; a
/// validation failure is fatal for this attempt and is not retried.
pub async fn exec(
  services: &Services,
  authz: &Authz,
  signable: &Value,
) -> Result<CompositeSignature, SigilError> {
  let raw = match authz.method {
    AuthzMethod::HttpPost => http_post::exec_http_post(services, authz, signable).await,
    AuthzMethod::FrameRpc => frame_rpc::exec_frame_rpc(services, authz, signable).await,
  }
  .map_err(|e| {
    trouble(authz, signable, &e);
    e
  })?;

  let composite = CompositeSignature::from_value(&raw)?;
  composite.validate(authz)?;
  Ok(composite)
}

/// Annotates a strategy failure with its full context before propagation.
fn trouble(authz: &Authz, signable: &Value, error: &SigilError) {
  tracing::error!(
    method = ?authz.method,
    endpoint = %authz.endpoint,
    signable = %signable,
    error = %error,
    "Trouble talking to wallet provider"
  );
}
