// tests/common.rs
#![allow(dead_code)] // Not every helper is used by every suite

use sigil::client::{Client, Services};
use sigil::error::SigilError;
use sigil::storage::MemoryStorage;
use sigil::surface::{ChannelPort, FrameHandle, FrameTarget, Surface};
use sigil::transport::{HttpRequest, HttpTransport};
use sigil::AuthzOptions;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Default level filter; can be overridden by RUST_LOG env variable
    let default_filter = "sigil=trace,debug,info,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

// Helper to create a bare runtime context
pub fn test_context() -> sigil::Context {
  setup_tracing();
  sigil::Context::new()
}

/// HTTP transport answering from a scripted queue, recording every request.
pub struct ScriptedHttp {
  responses: Mutex<VecDeque<Value>>,
  /// Served when the queue runs dry (e.g. endless PENDING polls).
  fallback: Mutex<Option<Value>>,
  requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
  pub fn new() -> Self {
    Self {
      responses: Mutex::new(VecDeque::new()),
      fallback: Mutex::new(None),
      requests: Mutex::new(Vec::new()),
    }
  }

  pub fn push(&self, response: Value) {
    self.responses.lock().unwrap().push_back(response);
  }

  pub fn set_fallback(&self, response: Value) {
    *self.fallback.lock().unwrap() = Some(response);
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
  async fn fetch(&self, request: HttpRequest) -> Result<Value, SigilError> {
    self.requests.lock().unwrap().push(request);
    if let Some(response) = self.responses.lock().unwrap().pop_front() {
      return Ok(response);
    }
    if let Some(response) = self.fallback.lock().unwrap().clone() {
      return Ok(response);
    }
    Err(SigilError::Internal("No scripted response left".to_string()))
  }
}

/// Surface counting mounts and actual teardowns.
pub struct CountingSurface {
  mounts: AtomicUsize,
  unmounts: Arc<AtomicUsize>,
  last_frame: Mutex<Option<FrameTarget>>,
}

impl CountingSurface {
  pub fn new() -> Self {
    Self {
      mounts: AtomicUsize::new(0),
      unmounts: Arc::new(AtomicUsize::new(0)),
      last_frame: Mutex::new(None),
    }
  }

  pub fn mounts(&self) -> usize {
    self.mounts.load(Ordering::SeqCst)
  }

  /// Number of times a frame was actually torn down (idempotent unmount
  /// calls beyond the first do not count).
  pub fn unmounts(&self) -> usize {
    self.unmounts.load(Ordering::SeqCst)
  }

  pub fn last_frame(&self) -> Option<FrameTarget> {
    self.last_frame.lock().unwrap().clone()
  }
}

impl Surface for CountingSurface {
  fn render(&self, frame: &FrameTarget) -> Result<FrameHandle, SigilError> {
    self.mounts.fetch_add(1, Ordering::SeqCst);
    *self.last_frame.lock().unwrap() = Some(frame.clone());
    let unmounts = Arc::clone(&self.unmounts);
    Ok(FrameHandle::new(move || {
      unmounts.fetch_add(1, Ordering::SeqCst);
    }))
  }
}

/// Everything a test needs to stand in for the outside world.
pub struct Harness {
  pub http: Arc<ScriptedHttp>,
  pub surface: Arc<CountingSurface>,
  pub storage: Arc<MemoryStorage>,
  pub port: ChannelPort,
}

impl Harness {
  pub fn new() -> Self {
    setup_tracing();
    Self {
      http: Arc::new(ScriptedHttp::new()),
      surface: Arc::new(CountingSurface::new()),
      storage: Arc::new(MemoryStorage::new()),
      port: ChannelPort::new(),
    }
  }

  pub fn with_storage(storage: MemoryStorage) -> Self {
    let mut harness = Self::new();
    harness.storage = Arc::new(storage);
    harness
  }

  pub fn services(&self) -> Services {
    Services {
      http: self.http.clone(),
      storage: self.storage.clone(),
      surface: self.surface.clone(),
      port: Arc::new(self.port.clone()),
      authz: AuthzOptions {
        poll_interval: Duration::from_millis(10),
        ready_timeout: Duration::from_millis(200),
      },
    }
  }

  pub async fn client(&self) -> Client {
    Client::new(self.services()).await
  }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if cond() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  cond()
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);
