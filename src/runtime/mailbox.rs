// src/runtime/mailbox.rs

//! Type aliases for process communication channels based on `async-channel`.

use crate::runtime::letter::Letter;

/// The sending end of a process's mailbox. Cloneable.
pub type MailboxSender = async_channel::Sender<Letter>;

/// The receiving end of a process's mailbox.
pub type MailboxReceiver = async_channel::Receiver<Letter>;

/// Creates a new mailbox channel pair.
///
/// Mailboxes are unbounded: enqueuing a letter never suspends the sender,
/// and letters are delivered strictly in arrival order.
pub fn mailbox() -> (MailboxSender, MailboxReceiver) {
  async_channel::unbounded()
}
