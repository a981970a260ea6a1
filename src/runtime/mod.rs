// src/runtime/mod.rs

//! Core asynchronous primitives: Letters, Mailboxes, Processes.

pub mod letter;
pub mod mailbox;
pub mod process;

pub use letter::{Body, Letter, ReplySlot, Topic, Xform};
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use process::{ActorContext, ProcessId, Processor};
