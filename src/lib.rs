//! sigil - Client library for wallet-provider authentication and signing,
//! built on a lightweight asynchronous actor runtime.
//!
//! Stateful subsystems (the config store, the current-user session) are
//! isolated processes with serially-processed mailboxes; the authorization
//! protocol drives them together with the external collaborators (HTTP
//! transport, rendering surface, message port, cold storage).

pub mod authz;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod runtime;
pub mod storage;
pub mod subscription;
pub mod surface;
pub mod transport;
pub mod user;
pub mod wallet;

// Re-export core types for user convenience
pub use authz::{Authz, AuthzMethod, AuthzOptions, CompositeSignature};
pub use client::{Client, Services};
pub use config::Config;
pub use context::{Context, Target};
pub use error::SigilError;
pub use runtime::{ActorContext, Body, Letter, ProcessId, Processor, ReplySlot, Topic};
pub use subscription::Subscription;
pub use user::{AccountAuthorization, CurrentUser, Param, UserSnapshot};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
