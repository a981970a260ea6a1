// src/authz/signature.rs

//! Composite signatures: normalization and structural validation.

use crate::authz::Authz;
use crate::error::SigilError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Strips the canonical `0x` prefix from an address.
pub fn sans_prefix(addr: &str) -> &str {
  addr.strip_prefix("0x").unwrap_or(addr)
}

/// Prepends the canonical `0x` prefix to a bare address.
pub fn with_prefix(addr: &str) -> String {
  if addr.starts_with("0x") {
    addr.to_string()
  } else {
    format!("0x{}", addr)
  }
}

/// The normalized output of an authorization attempt.
///
/// Providers historically answer with either a `sig` or a `signature`
/// field; after normalization both are populated and identical, and `addr`
/// is in canonical prefix-stripped form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeSignature {
  pub addr: String,
  #[serde(rename = "keyId", default)]
  pub key_id: Option<u64>,
  pub sig: String,
  pub signature: String,
}

impl CompositeSignature {
  /// Builds a normalized composite from the raw payload a strategy
  /// resolved with: reconciles the `sig`/`signature` aliases and strips
  /// the address prefix.
  pub fn from_value(raw: &Value) -> Result<Self, SigilError> {
    let obj = raw.as_object().ok_or_else(|| {
      SigilError::MalformedResponse(format!("Composite signature is not an object: {}", raw))
    })?;

    let sig = obj.get("sig").and_then(Value::as_str);
    let signature = obj.get("signature").and_then(Value::as_str);
    let reconciled = sig.or(signature).unwrap_or_default().to_string();

    let addr = obj
      .get("addr")
      .and_then(Value::as_str)
      .map(|a| sans_prefix(a).to_string())
      .unwrap_or_default();

    Ok(Self {
      addr,
      key_id: obj.get("keyId").and_then(Value::as_u64),
      sig: reconciled.clone(),
      signature: reconciled,
    })
  }

  /// Structural validation against the originating descriptor. Failure is
  /// fatal for the attempt; callers do not retry.
  pub fn validate(&self, authz: &Authz) -> Result<(), SigilError> {
    if self.signature.is_empty() {
      return Err(SigilError::ValidationFailure(
        "Composite signature carries no signature".to_string(),
      ));
    }
    if self.sig != self.signature {
      return Err(SigilError::ValidationFailure(
        "sig/signature aliases diverged".to_string(),
      ));
    }
    if let Some(expected) = authz.addr.as_deref() {
      if sans_prefix(expected) != self.addr {
        return Err(SigilError::ValidationFailure(format!(
          "Signer address {:?} does not match expected {:?}",
          self.addr,
          sans_prefix(expected)
        )));
      }
    }
    Ok(())
  }
}
