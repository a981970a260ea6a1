// src/config.rs

//! Config store actor and its public handle.
//!
//! A single named process owns the key/value mapping; every operation is a
//! letter. Mutating operations broadcast a full post-mutation snapshot to
//! subscribers, exactly once each, after the mutation is fully applied.

use crate::context::Context;
use crate::error::SigilError;
use crate::runtime::letter::{Body, Letter, Topic};
use crate::runtime::process::{ActorContext, Processor};
use crate::subscription::Subscription;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

/// Registry name of the config store process.
pub const CONFIG_NAME: &str = "config";

/// Reply window for config reads.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// The process owning the key/value mapping.
#[derive(Debug, Default)]
pub(crate) struct ConfigStore {
  entries: HashMap<String, Value>,
}

impl ConfigStore {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  fn snapshot_all(&self) -> Value {
    let map: Map<String, Value> = self
      .entries
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    Value::Object(map)
  }

  fn snapshot_matching(&self, pattern: &Regex) -> Value {
    let map: Map<String, Value> = self
      .entries
      .iter()
      .filter(|(k, _)| pattern.is_match(k))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    Value::Object(map)
  }
}

#[async_trait]
impl Processor for ConfigStore {
  async fn handle(&mut self, ctx: &mut ActorContext, letter: Letter) -> Result<(), SigilError> {
    let from = letter.from;
    match letter.body {
      Body::ConfigPut { key, value } => {
        let key = key.ok_or(SigilError::MissingArgument("key"))?;
        self.entries.insert(key, value);
        ctx.broadcast(Topic::Config, self.snapshot_all()).await;
        Ok(())
      }
      Body::ConfigGet { key, fallback, reply } => {
        let key = key.ok_or(SigilError::MissingArgument("key"))?;
        let value = self.entries.get(&key).cloned().unwrap_or(fallback);
        reply.reply(value).await;
        Ok(())
      }
      Body::ConfigUpdate { key, xform } => {
        let key = key.ok_or(SigilError::MissingArgument("key"))?;
        let current = self.entries.get(&key).cloned().unwrap_or(Value::Null);
        let next = match xform {
          Some(xform) => xform(current),
          None => current, // identity
        };
        self.entries.insert(key, next);
        ctx.broadcast(Topic::Config, self.snapshot_all()).await;
        Ok(())
      }
      Body::ConfigDelete { key } => {
        let key = key.ok_or(SigilError::MissingArgument("key"))?;
        self.entries.remove(&key);
        ctx.broadcast(Topic::Config, self.snapshot_all()).await;
        Ok(())
      }
      Body::ConfigWhere { pattern, reply } => {
        let pattern = pattern.ok_or(SigilError::MissingArgument("pattern"))?;
        let compiled = Regex::new(&pattern)
          .map_err(|e| SigilError::Internal(format!("Invalid config/where pattern: {}", e)))?;
        reply.reply(self.snapshot_matching(&compiled)).await;
        Ok(())
      }
      Body::Subscribe => {
        let from = from.ok_or(SigilError::MissingArgument("from"))?;
        ctx.subscribe(from);
        // Catch-up snapshot: a late subscriber never has a missed-update
        // window, though history is not replayed.
        ctx
          .send(
            from,
            Body::Updated {
              topic: Topic::Config,
              data: self.snapshot_all(),
            },
          )
          .await
      }
      Body::Unsubscribe => {
        let from = from.ok_or(SigilError::MissingArgument("from"))?;
        ctx.unsubscribe(from);
        Ok(())
      }
      other => Err(SigilError::UnexpectedMessage(other.variant_name())),
    }
  }
}

/// Public handle to the config store. Cloneable; all calls route through the
/// registry by name.
#[derive(Debug, Clone)]
pub struct Config {
  ctx: Context,
}

impl Config {
  pub(crate) fn new(ctx: Context) -> Self {
    Self { ctx }
  }

  /// Sets `key` to `value`.
  pub async fn put(&self, key: &str, value: Value) -> Result<(), SigilError> {
    self
      .ctx
      .send(
        CONFIG_NAME,
        Body::ConfigPut {
          key: Some(key.to_string()),
          value,
        },
      )
      .await
  }

  /// Reads `key`, replying `Value::Null` when unset.
  pub async fn get(&self, key: &str) -> Result<Value, SigilError> {
    self.get_or(key, Value::Null).await
  }

  /// Reads `key`, replying `fallback` when unset (or deleted).
  pub async fn get_or(&self, key: &str, fallback: Value) -> Result<Value, SigilError> {
    let key = key.to_string();
    self
      .ctx
      .request(
        CONFIG_NAME,
        move |reply| Body::ConfigGet {
          key: Some(key),
          fallback,
          reply,
        },
        REPLY_TIMEOUT,
      )
      .await
  }

  /// Replaces the value under `key` with `xform(current)`; an unset key
  /// presents as `Value::Null`.
  pub async fn update(
    &self,
    key: &str,
    xform: impl FnOnce(Value) -> Value + Send + 'static,
  ) -> Result<(), SigilError> {
    self
      .ctx
      .send(
        CONFIG_NAME,
        Body::ConfigUpdate {
          key: Some(key.to_string()),
          xform: Some(Box::new(xform)),
        },
      )
      .await
  }

  /// Removes `key`.
  pub async fn delete(&self, key: &str) -> Result<(), SigilError> {
    self
      .ctx
      .send(
        CONFIG_NAME,
        Body::ConfigDelete {
          key: Some(key.to_string()),
        },
      )
      .await
  }

  /// Snapshot restricted to keys matching `pattern` (a regular expression).
  pub async fn matching(&self, pattern: &str) -> Result<Map<String, Value>, SigilError> {
    let pattern = pattern.to_string();
    let snapshot = self
      .ctx
      .request(
        CONFIG_NAME,
        move |reply| Body::ConfigWhere {
          pattern: Some(pattern),
          reply,
        },
        REPLY_TIMEOUT,
      )
      .await?;
    match snapshot {
      Value::Object(map) => Ok(map),
      other => Err(SigilError::MalformedResponse(format!(
        "config/where replied with non-object {:?}",
        other
      ))),
    }
  }

  /// Subscribes `callback` to config snapshots. The callback immediately
  /// receives one catch-up snapshot, then one snapshot per mutation. The
  /// returned handle is safe to invoke any number of times.
  pub async fn subscribe(
    &self,
    callback: impl Fn(Value) + Send + 'static,
  ) -> Subscription {
    let pid = self
      .ctx
      .spawn_fn(move |mut actx: ActorContext| async move {
        if actx.send(CONFIG_NAME, Body::Subscribe).await.is_err() {
          return;
        }
        loop {
          match actx.receive().await {
            Ok(letter) => match letter.body {
              Body::Exit => {
                let _ = actx.send(CONFIG_NAME, Body::Unsubscribe).await;
                return;
              }
              Body::Updated { data, .. } => callback(data),
              other => {
                tracing::warn!(tag = other.variant_name(), "Config subscriber ignoring letter");
              }
            },
            Err(_) => return,
          }
        }
      })
      .await;
    Subscription::new(self.ctx.clone(), pid)
  }
}
