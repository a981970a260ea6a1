// src/context.rs

use crate::error::SigilError;
use crate::runtime::letter::{Body, Letter, ReplySlot};
use crate::runtime::mailbox::{mailbox, MailboxSender};
use crate::runtime::process::{run_letter_loop, ActorContext, ProcessId, Processor};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Notify, RwLock};

/// Addressing for `send`: either a raw process id or a registered name.
#[derive(Debug, Clone)]
pub enum Target {
  Pid(ProcessId),
  Name(String),
}

impl From<ProcessId> for Target {
  fn from(pid: ProcessId) -> Self {
    Target::Pid(pid)
  }
}

impl From<&str> for Target {
  fn from(name: &str) -> Self {
    Target::Name(name.to_string())
  }
}

/// Holds the internal state shared by multiple Context handles.
pub(crate) struct ContextInner {
  /// Next available unique process id.
  next_handle: AtomicUsize,

  /// Map of live process ids to their mailboxes.
  processes: RwLock<HashMap<ProcessId, MailboxSender>>,

  /// Registry of named processes. Spawning under a taken name repoints the
  /// name at the new process; the prior incarnation is logically replaced.
  names: RwLock<HashMap<String, ProcessId>>,

  // --- Shutdown Coordination ---
  /// Used to notify tasks waiting in `Context::term()` when shutdown might
  /// be complete.
  shutdown_notify: Notify,
  /// Flag indicating if shutdown has been initiated.
  shutdown_initiated: AtomicBool,
}

impl ContextInner {
  fn new() -> Self {
    Self {
      next_handle: AtomicUsize::new(1),
      processes: RwLock::new(HashMap::new()),
      names: RwLock::new(HashMap::new()),
      shutdown_notify: Notify::new(),
      shutdown_initiated: AtomicBool::new(false),
    }
  }

  fn next_pid(&self) -> ProcessId {
    // Relaxed ordering is sufficient for a simple counter
    ProcessId(self.next_handle.fetch_add(1, Ordering::Relaxed))
  }

  async fn register(&self, pid: ProcessId, sender: MailboxSender, name: Option<&str>) {
    self.processes.write().await.insert(pid, sender);
    if let Some(name) = name {
      let mut names_w = self.names.write().await;
      if let Some(prior) = names_w.insert(name.to_string(), pid) {
        tracing::debug!(name = name, prior = %prior, pid = %pid, "Named process replaced");
      }
    }
    tracing::debug!(pid = %pid, name = ?name, "Process registered");
  }

  async fn unregister(&self, pid: ProcessId) {
    let mut processes_w = self.processes.write().await;
    if processes_w.remove(&pid).is_some() {
      tracing::debug!(pid = %pid, "Process unregistered");
    }
    let empty = processes_w.is_empty();
    drop(processes_w);

    // Drop any name still pointing at this process.
    let mut names_w = self.names.write().await;
    names_w.retain(|_, registered| *registered != pid);
    drop(names_w);

    if empty && self.shutdown_initiated.load(Ordering::Acquire) {
      tracing::debug!("Last process unregistered during shutdown, notifying term waiters");
      self.shutdown_notify.notify_waiters();
    }
  }

  async fn resolve(&self, target: &Target) -> Result<MailboxSender, SigilError> {
    match target {
      Target::Pid(pid) => self
        .processes
        .read()
        .await
        .get(pid)
        .cloned()
        .ok_or(SigilError::MailboxClosed),
      Target::Name(name) => {
        let pid = self
          .names
          .read()
          .await
          .get(name)
          .copied()
          .ok_or_else(|| SigilError::UnknownProcess(name.clone()))?;
        self
          .processes
          .read()
          .await
          .get(&pid)
          .cloned()
          .ok_or_else(|| SigilError::UnknownProcess(name.clone()))
      }
    }
  }

  /// Initiates shutdown: sends `Exit` to every live process.
  async fn shutdown(&self) {
    if self
      .shutdown_initiated
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      tracing::info!("Context shutdown initiated");
      let processes_r = self.processes.read().await;
      if processes_r.is_empty() {
        self.shutdown_notify.notify_waiters();
        return;
      }
      let mailboxes: Vec<_> = processes_r.values().cloned().collect();
      drop(processes_r);

      let exit_futures = mailboxes.into_iter().map(|mb| async move {
        // Ignore send errors; the process might have already stopped.
        let _ = mb
          .send(Letter {
            from: None,
            body: Body::Exit,
          })
          .await;
      });
      futures::future::join_all(exit_futures).await;
    } else {
      tracing::debug!("Context shutdown already initiated");
    }
  }

  /// Waits until every process has unregistered after shutdown began.
  async fn wait_for_termination(&self) {
    loop {
      if self.processes.read().await.is_empty() {
        tracing::info!("Context termination complete (all processes stopped)");
        break;
      }
      tokio::select! {
        _ = self.shutdown_notify.notified() => continue,
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
          tracing::warn!("Timeout while waiting for context termination, still checking...");
        }
      }
    }
  }
}

/// A handle to the actor runtime: the process table, the name registry, and
/// everything that spawns or sends. Cloneable and cheap to clone.
///
/// There is no implicit teardown; named processes live for the whole run
/// unless [`Context::term`] is called.
#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  /// Creates a new, independent runtime context with an empty registry.
  pub fn new() -> Self {
    tracing::debug!("Creating new sigil Context");
    Self {
      inner: Arc::new(ContextInner::new()),
    }
  }

  /// Spawns a letter-loop process driven by `processor`.
  pub async fn spawn<P: Processor>(&self, processor: P) -> ProcessId {
    self.spawn_inner(None, processor).await
  }

  /// Spawns a letter-loop process and registers it under `name`. If the
  /// name is already taken the registry is repointed at the new process.
  pub async fn spawn_named<P: Processor>(&self, name: &str, processor: P) -> ProcessId {
    self.spawn_inner(Some(name), processor).await
  }

  async fn spawn_inner<P: Processor>(&self, name: Option<&str>, processor: P) -> ProcessId {
    let pid = self.inner.next_pid();
    let (sender, receiver) = mailbox();
    self.inner.register(pid, sender, name).await;
    let actx = ActorContext::new(pid, self.clone(), receiver);
    tokio::spawn(run_letter_loop(processor, actx));
    pid
  }

  /// Spawns a process whose body drives its own `receive()` loop. The
  /// process ends when `f` returns; it is then unregistered.
  pub async fn spawn_fn<F, Fut>(&self, f: F) -> ProcessId
  where
    F: FnOnce(ActorContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let pid = self.inner.next_pid();
    let (sender, receiver) = mailbox();
    self.inner.register(pid, sender, None).await;
    let actx = ActorContext::new(pid, self.clone(), receiver);
    let context = self.clone();
    tokio::spawn(async move {
      f(actx).await;
      context.unregister(pid).await;
      tracing::debug!(pid = %pid, "Process loop ended");
    });
    pid
  }

  /// Enqueues a letter with no sending process (public API callers).
  pub async fn send(&self, target: impl Into<Target>, body: Body) -> Result<(), SigilError> {
    self.send_from(None, target, body).await
  }

  pub(crate) async fn send_from(
    &self,
    from: Option<ProcessId>,
    target: impl Into<Target>,
    body: Body,
  ) -> Result<(), SigilError> {
    let target = target.into();
    let sender = self.inner.resolve(&target).await?;
    tracing::trace!(dest = ?target, tag = body.variant_name(), "Enqueueing letter");
    sender
      .send(Letter { from, body })
      .await
      .map_err(|_| SigilError::MailboxClosed)
  }

  /// Sends a reply-bearing letter and suspends the caller until the
  /// correlated reply arrives or `timeout` elapses, whichever first.
  ///
  /// A `timeout` of zero waits indefinitely. The timeout is caller-local:
  /// an unacknowledged reply fails this call without affecting the target
  /// process.
  pub async fn request(
    &self,
    target: impl Into<Target>,
    make_body: impl FnOnce(ReplySlot) -> Body,
    timeout: Duration,
  ) -> Result<Value, SigilError> {
    let (tx, rx) = oneshot::channel();
    let body = make_body(ReplySlot::new(tx));
    self.send_from(None, target, body).await?;

    if timeout.is_zero() {
      rx.await.map_err(|_| SigilError::MailboxClosed)
    } else {
      match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(SigilError::MailboxClosed),
        Err(_) => Err(SigilError::Timeout),
      }
    }
  }

  /// Looks up the process currently registered under `name`.
  pub async fn whereis(&self, name: &str) -> Option<ProcessId> {
    self.inner.names.read().await.get(name).copied()
  }

  pub(crate) async fn unregister(&self, pid: ProcessId) {
    self.inner.unregister(pid).await;
  }

  /// Initiates background shutdown of every process in this context.
  /// Returns immediately; processes drain their mailboxes and stop.
  pub async fn shutdown(&self) {
    self.inner.shutdown().await;
  }

  /// Shuts every process down and waits for clean termination. Consumes the
  /// handle; use for final cleanup.
  pub async fn term(self) {
    self.inner.shutdown().await;
    self.inner.wait_for_termination().await;
  }
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context").finish_non_exhaustive()
  }
}
