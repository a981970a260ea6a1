// src/transport.rs

//! HTTP transport collaborator.
//!
//! The protocol core only ever speaks JSON-in/JSON-out through the narrow
//! [`HttpTransport`] trait; [`ReqwestTransport`] is the production
//! implementation. Tests script their own.

use crate::error::SigilError;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Get,
  Post,
}

/// A single JSON request to an external endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub url: String,
  pub method: HttpMethod,
  pub body: Option<Value>,
}

impl HttpRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      method: HttpMethod::Get,
      body: None,
    }
  }

  pub fn post(url: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      url: url.into(),
      method: HttpMethod::Post,
      body,
    }
  }
}

/// Narrow contract to the HTTP world: one JSON round-trip per call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
  async fn fetch(&self, request: HttpRequest) -> Result<Value, SigilError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for ReqwestTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
  async fn fetch(&self, request: HttpRequest) -> Result<Value, SigilError> {
    tracing::debug!(url = %request.url, method = ?request.method, "Fetching");
    let builder = match request.method {
      HttpMethod::Get => self.client.get(&request.url),
      HttpMethod::Post => {
        let builder = self.client.post(&request.url);
        match &request.body {
          Some(body) => builder.json(body),
          None => builder.header(reqwest::header::CONTENT_TYPE, "application/json"),
        }
      }
    };
    let response = builder.send().await?.error_for_status()?;
    let value = response.json::<Value>().await?;
    Ok(value)
  }
}
