// src/user.rs

//! Current-user session store actor and its public handle.
//!
//! One named process owns the session record. It loads from cold storage on
//! start (discarding stale-version records), merges patches shallowly,
//! persists and broadcasts after every mutation, and answers snapshot and
//! parameter requests. Reads of legacy fields go through deprecation
//! accessors on [`UserSnapshot`] at the public boundary; the actor's own
//! state is never wrapped.

use crate::authz::{self, Authz, CompositeSignature};
use crate::client::Services;
use crate::config::Config;
use crate::context::Context;
use crate::error::SigilError;
use crate::runtime::letter::{Body, Letter, Topic};
use crate::runtime::process::{ActorContext, Processor};
use crate::storage::{load_versioned, ColdStorage};
use crate::subscription::Subscription;
use crate::surface::{msg, FrameTarget};
use crate::transport::HttpRequest;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::error::RecvError;

/// Registry name of the session store process.
pub const CURRENT_USER_NAME: &str = "current_user";

/// Version tag of the session record shape. A persisted record with any
/// other tag is discarded on load.
pub const SESSION_VERSION: &str = "0.1.1";

/// Reply window for parameter reads.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// The fixed default shape of the session record.
pub fn default_session() -> Value {
  json!({
    "VERSION": SESSION_VERSION,
    "addr": null,
    "cid": null,
    "loggedIn": null,
    "verified": null,
    "identity": {
      "name": null,
      "addr": null,
      "avatar": null,
      "cover": null,
      "color": null,
      "bio": null
    },
    "scoped": {},
    "provider": {
      "addr": null,
      "pid": null,
      "name": null,
      "icon": null
    },
    "authorizations": [],
    "keyId": null
  })
}

/// The process owning the session record.
pub(crate) struct SessionStore {
  state: Map<String, Value>,
  storage: Arc<dyn ColdStorage>,
}

impl SessionStore {
  pub(crate) fn new(storage: Arc<dyn ColdStorage>) -> Self {
    let state = match default_session() {
      Value::Object(map) => map,
      _ => unreachable!("default session is an object"),
    };
    Self { state, storage }
  }

  fn snapshot(&self) -> Value {
    Value::Object(self.state.clone())
  }

  /// Shallow merge: every top-level key of the patch replaces the current
  /// entry wholesale. Never a deep merge, never a full replace.
  fn merge(&mut self, patch: &Value) {
    if let Value::Object(patch) = patch {
      for (key, value) in patch {
        self.state.insert(key.clone(), value.clone());
      }
    }
  }

  async fn persist(&self) {
    // A persist failure must not lose the in-memory mutation or stop the
    // broadcast; observers see applied state either way.
    if let Err(e) = self.storage.put(&self.snapshot()).await {
      tracing::error!(error = %e, "Failed to persist session record");
    }
  }
}

#[async_trait]
impl Processor for SessionStore {
  async fn init(&mut self, _ctx: &mut ActorContext) -> Result<(), SigilError> {
    match load_versioned(self.storage.as_ref(), SESSION_VERSION).await {
      Ok(Some(record)) => self.merge(&record),
      Ok(None) => {}
      Err(SigilError::ConfigMismatch) => {
        // Recovered locally: stale record discarded, defaults kept.
        tracing::warn!("Persisted session record discarded; starting from defaults");
      }
      Err(e) => {
        tracing::warn!(error = %e, "Cold storage unreadable; starting from defaults");
      }
    }
    Ok(())
  }

  async fn handle(&mut self, ctx: &mut ActorContext, letter: Letter) -> Result<(), SigilError> {
    let from = letter.from;
    match letter.body {
      Body::SessionMerge { patch } => {
        self.merge(&patch);
        self.persist().await;
        ctx.broadcast(Topic::CurrentUser, self.snapshot()).await;
        Ok(())
      }
      Body::SessionReset => {
        self.merge(&default_session());
        self.persist().await;
        ctx.broadcast(Topic::CurrentUser, self.snapshot()).await;
        Ok(())
      }
      Body::SessionSnapshot { reply } => {
        reply.reply(self.snapshot()).await;
        Ok(())
      }
      Body::SessionParam { key, reply } => {
        let key = key.ok_or(SigilError::MissingArgument("key"))?;
        let value = self.state.get("addr").cloned().unwrap_or(Value::Null);
        reply
          .reply(json!({ "key": key, "value": value, "xform": "Identity" }))
          .await;
        Ok(())
      }
      Body::Subscribe => {
        let from = from.ok_or(SigilError::MissingArgument("from"))?;
        ctx.subscribe(from);
        ctx
          .send(
            from,
            Body::Updated {
              topic: Topic::CurrentUser,
              data: self.snapshot(),
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

/// Outward-facing view of the session record.
///
/// Legacy fields are read through explicit accessors that emit a
/// deprecation warning on every access and return the value unchanged.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
  raw: Value,
}

fn deprecation_notice(field: &str) {
  tracing::warn!(
    field,
    "Deprecation notice: access to this CurrentUser field will cease to work in a future release"
  );
}

impl UserSnapshot {
  pub(crate) fn new(raw: Value) -> Self {
    Self { raw }
  }

  pub fn raw(&self) -> &Value {
    &self.raw
  }

  pub fn addr(&self) -> Option<&str> {
    self.raw.get("addr").and_then(Value::as_str)
  }

  pub fn cid(&self) -> Option<&str> {
    self.raw.get("cid").and_then(Value::as_str)
  }

  pub fn logged_in(&self) -> bool {
    self.raw.get("loggedIn").and_then(Value::as_bool).unwrap_or(false)
  }

  pub fn key_id(&self) -> Option<u64> {
    self.raw.get("keyId").and_then(Value::as_u64)
  }

  /// Authorization services stored for this user; malformed entries are
  /// skipped with a warning.
  pub fn authorizations(&self) -> Vec<Authz> {
    match self.raw.get("authorizations") {
      Some(Value::Array(entries)) => entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Authz>(entry.clone()) {
          Ok(authz) => Some(authz),
          Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed authorization service");
            None
          }
        })
        .collect(),
      _ => Vec::new(),
    }
  }

  // --- Deprecated fields ---

  pub fn verified(&self) -> Option<bool> {
    deprecation_notice("verified");
    self.raw.get("verified").and_then(Value::as_bool)
  }

  pub fn identity(&self) -> Value {
    deprecation_notice("identity");
    self.raw.get("identity").cloned().unwrap_or(Value::Null)
  }

  pub fn scoped(&self) -> Value {
    deprecation_notice("scoped");
    self.raw.get("scoped").cloned().unwrap_or(Value::Null)
  }

  pub fn provider(&self) -> Value {
    deprecation_notice("provider");
    self.raw.get("provider").cloned().unwrap_or(Value::Null)
  }
}

/// Typed parameter descriptor built from one session field, consumed by
/// downstream transaction builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
  pub key: String,
  pub value: Value,
  pub xform: String,
}

/// A user authorization: the signer identity plus the stored services able
/// to produce a signature for it.
#[derive(Clone)]
pub struct AccountAuthorization {
  pub addr: Option<String>,
  pub key_id: Option<u64>,
  pub services: Vec<Authz>,
  deps: Arc<Services>,
}

impl AccountAuthorization {
  /// Runs the authorization protocol for `signable` against the user's
  /// first stored service.
  pub async fn sign(&self, signable: &Value) -> Result<CompositeSignature, SigilError> {
    let service = self
      .services
      .first()
      .ok_or(SigilError::MissingArgument("authorization service"))?;
    authz::exec(&self.deps, service, signable).await
  }
}

/// Composite id derived from a provider descriptor.
fn composite_id(provider: &Value) -> Value {
  let pid = provider.get("pid").and_then(Value::as_str);
  let addr = provider.get("addr").and_then(Value::as_str);
  match (pid, addr) {
    (Some(pid), Some(addr)) => Value::String(format!("{}|{}", pid, addr)),
    _ => Value::Null,
  }
}

/// Public handle to the current-user session. Cloneable; all calls route
/// through the registry by name.
#[derive(Clone)]
pub struct CurrentUser {
  ctx: Context,
  config: Config,
  deps: Arc<Services>,
}

impl CurrentUser {
  pub(crate) fn new(ctx: Context, config: Config, deps: Arc<Services>) -> Self {
    Self { ctx, config, deps }
  }

  /// Current session state. Waits indefinitely for the actor's reply.
  pub async fn snapshot(&self) -> Result<UserSnapshot, SigilError> {
    let raw = self
      .ctx
      .request(
        CURRENT_USER_NAME,
        |reply| Body::SessionSnapshot { reply },
        Duration::ZERO,
      )
      .await?;
    Ok(UserSnapshot::new(raw))
  }

  /// Authenticates against the configured wallet provider.
  ///
  /// A logged-in session short-circuits to its snapshot. Otherwise the
  /// challenge frame is mounted and the flow waits for the provider's
  /// challenge response on the message port, exchanges the returned code
  /// for the user record, and merges it into the session.
  pub async fn authenticate(&self) -> Result<UserSnapshot, SigilError> {
    let user = self.snapshot().await?;
    if user.logged_in() {
      return Ok(user);
    }

    let handshake = match self.config.get("challenge.handshake").await? {
      Value::String(endpoint) => endpoint,
      _ => return Err(SigilError::MissingArgument("challenge.handshake")),
    };
    let mut params = HashMap::new();
    params.insert("nonce".to_string(), authz::random_id());
    if let Value::String(scope) = self.config.get("challenge.scope").await? {
      params.insert("scope".to_string(), scope);
    }
    if let Value::String(origin) = self.config.get("origin").await? {
      params.insert("l6n".to_string(), origin);
    }

    // Subscribe before mounting so the response cannot be missed.
    let mut inbound = self.deps.port.subscribe();
    let frame = FrameTarget {
      endpoint: handshake,
      params,
    };
    let handle = self.deps.surface.render(&frame)?;

    let challenge = Self::await_challenge_response(&mut inbound).await;
    // Torn down exactly once on every exit path.
    handle.unmount();
    let challenge = challenge?;

    let hks = challenge
      .get("hks")
      .and_then(Value::as_str)
      .ok_or_else(|| SigilError::MalformedResponse("Challenge response without 'hks'".to_string()))?;
    let code = challenge
      .get("code")
      .and_then(Value::as_str)
      .ok_or_else(|| SigilError::MalformedResponse("Challenge response without 'code'".to_string()))?;

    let mut query = HashMap::new();
    query.insert("code".to_string(), code.to_string());
    let url = authz::url_from_service(hks, &query)?;
    let fetched = self.deps.http.fetch(HttpRequest::get(url)).await?;

    let mut patch = match fetched {
      Value::Object(map) => map,
      other => {
        return Err(SigilError::MalformedResponse(format!(
          "Handshake callback returned non-object {}",
          other
        )))
      }
    };
    let cid = composite_id(patch.get("provider").unwrap_or(&Value::Null));
    patch.insert("cid".to_string(), cid);
    patch.insert("loggedIn".to_string(), Value::Bool(true));
    patch.insert("verified".to_string(), Value::Bool(true));

    self
      .ctx
      .send(
        CURRENT_USER_NAME,
        Body::SessionMerge {
          patch: Value::Object(patch),
        },
      )
      .await?;
    self.snapshot().await
  }

  async fn await_challenge_response(
    inbound: &mut tokio::sync::broadcast::Receiver<Value>,
  ) -> Result<Value, SigilError> {
    loop {
      match inbound.recv().await {
        Ok(message) => {
          if message.get(msg::TYPE_FIELD).and_then(Value::as_str) == Some(msg::CHALLENGE_RESPONSE) {
            return Ok(message);
          }
          // Stray message; keep waiting.
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "Challenge wait lagged behind the message port");
        }
        Err(RecvError::Closed) => return Err(SigilError::MailboxClosed),
      }
    }
  }

  /// Resets the session to its default record.
  pub async fn unauthenticate(&self) -> Result<(), SigilError> {
    self.ctx.send(CURRENT_USER_NAME, Body::SessionReset).await
  }

  /// Authenticates (if needed) and returns the current user's authorization,
  /// ready to produce composite signatures.
  pub async fn authorization(&self) -> Result<AccountAuthorization, SigilError> {
    let user = self.authenticate().await?;
    Ok(AccountAuthorization {
      addr: user.addr().map(str::to_string),
      key_id: user.key_id(),
      services: user.authorizations(),
      deps: self.deps.clone(),
    })
  }

  /// Authenticates (if needed) and builds a typed parameter descriptor from
  /// the session's signer address.
  pub async fn param(&self, key: &str) -> Result<Param, SigilError> {
    self.authenticate().await?;
    let key = key.to_string();
    let raw = self
      .ctx
      .request(
        CURRENT_USER_NAME,
        move |reply| Body::SessionParam {
          key: Some(key),
          reply,
        },
        REPLY_TIMEOUT,
      )
      .await?;
    Ok(serde_json::from_value(raw)?)
  }

  /// Subscribes `callback` to session snapshots. The callback immediately
  /// receives one catch-up snapshot, then one per mutation. The returned
  /// handle is safe to invoke any number of times.
  pub async fn subscribe(
    &self,
    callback: impl Fn(UserSnapshot) + Send + 'static,
  ) -> Subscription {
    let pid = self
      .ctx
      .spawn_fn(move |mut actx: ActorContext| async move {
        if actx.send(CURRENT_USER_NAME, Body::Subscribe).await.is_err() {
          return;
        }
        loop {
          match actx.receive().await {
            Ok(letter) => match letter.body {
              Body::Exit => {
                let _ = actx.send(CURRENT_USER_NAME, Body::Unsubscribe).await;
                return;
              }
              Body::Updated { data, .. } => callback(UserSnapshot::new(data)),
              other => {
                tracing::warn!(tag = other.variant_name(), "User subscriber ignoring letter");
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
