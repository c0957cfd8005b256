//! Ownership tokens for running units
//!
//! Every broker and device runs in its own tokio task. The orchestrator holds
//! exactly one [`UnitHandle`] per task; dropping the handle aborts the task.

use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Identity of a running unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitTag {
    Broker,
    Device(Uuid),
}

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitTag::Broker => write!(f, "broker"),
            UnitTag::Device(id) => write!(f, "device {}", id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("{0} mailbox is full")]
    MailboxFull(UnitTag),

    #[error("{0} is no longer running")]
    MailboxClosed(UnitTag),
}

/// Handle to a unit task.
///
/// `B` is the unit's mailbox: a request sender for units that take requests,
/// `()` for units that only ever talk back.
#[derive(Debug)]
pub struct UnitHandle<B = ()> {
    tag: UnitTag,
    mailbox: B,
    task: JoinHandle<()>,
}

impl UnitHandle {
    /// A unit that only ever talks back
    pub fn detached(tag: UnitTag, task: JoinHandle<()>) -> Self {
        Self {
            tag,
            mailbox: (),
            task,
        }
    }
}

impl<M> UnitHandle<mpsc::Sender<M>> {
    /// A unit that takes requests through `mailbox`
    pub fn with_mailbox(tag: UnitTag, mailbox: mpsc::Sender<M>, task: JoinHandle<()>) -> Self {
        Self { tag, mailbox, task }
    }

    /// Queues a request without waiting for mailbox capacity
    pub fn send(&self, request: M) -> Result<(), UnitError> {
        self.mailbox.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => UnitError::MailboxFull(self.tag),
            mpsc::error::TrySendError::Closed(_) => UnitError::MailboxClosed(self.tag),
        })
    }
}

impl<B> UnitHandle<B> {
    pub fn tag(&self) -> UnitTag {
        self.tag
    }

    /// Aborts the unit task. Messages it already queued stay deliverable.
    pub fn terminate(self) {
        debug!("Terminating {}", self.tag);
        drop(self);
    }
}

impl<B> Drop for UnitHandle<B> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
