// src/client.rs

//! Client wiring: collaborator bundle plus the public entry point that
//! spawns the long-lived named actors.

use crate::authz::AuthzOptions;
use crate::config::{Config, ConfigStore, CONFIG_NAME};
use crate::context::Context;
use crate::storage::{ColdStorage, MemoryStorage};
use crate::surface::{ChannelPort, HeadlessSurface, MessagePort, Surface};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::user::{CurrentUser, SessionStore, CURRENT_USER_NAME};

use std::sync::Arc;

/// External collaborators the core drives through narrow contracts, plus
/// the protocol timings.
pub struct Services {
  pub http: Arc<dyn HttpTransport>,
  pub storage: Arc<dyn ColdStorage>,
  pub surface: Arc<dyn Surface>,
  pub port: Arc<dyn MessagePort>,
  pub authz: AuthzOptions,
}

impl Default for Services {
  fn default() -> Self {
    Self {
      http: Arc::new(ReqwestTransport::new()),
      storage: Arc::new(MemoryStorage::new()),
      surface: Arc::new(HeadlessSurface),
      port: Arc::new(ChannelPort::new()),
      authz: AuthzOptions::default(),
    }
  }
}

/// The assembled client: an actor runtime context with the config and
/// session stores spawned, and public handles onto both.
///
/// The named actors are spawned exactly once here and live for the whole
/// run; there is no implicit teardown short of [`Client::term`].
pub struct Client {
  ctx: Context,
  config: Config,
  user: CurrentUser,
}

impl Client {
  pub async fn new(services: Services) -> Self {
    let ctx = Context::new();
    let services = Arc::new(services);

    ctx.spawn_named(CONFIG_NAME, ConfigStore::new()).await;
    ctx
      .spawn_named(CURRENT_USER_NAME, SessionStore::new(services.storage.clone()))
      .await;

    let config = Config::new(ctx.clone());
    let user = CurrentUser::new(ctx.clone(), config.clone(), services);
    Self { ctx, config, user }
  }

  /// The config store handle.
  pub fn config(&self) -> Config {
    self.config.clone()
  }

  /// The current-user session handle.
  pub fn current_user(&self) -> CurrentUser {
    self.user.clone()
  }

  /// The underlying actor runtime, for embedders spawning their own
  /// processes.
  pub fn context(&self) -> &Context {
    &self.ctx
  }

  /// Shuts every process down and waits for clean termination.
  pub async fn term(self) {
    self.ctx.term().await;
  }
}
