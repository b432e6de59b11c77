//! The asynchronous operation queue.
//!
//! Mutating API calls append an operation record and return immediately with
//! a provisional success; the tick drains the queue FIFO at its safe point,
//! applies each operation under the group lock, and reports every completion
//! through the application's callback. An operation whose endpoints vanished
//! while it was queued completes with [`OpStatus::PortGone`] and still fires
//! the callback.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::registry::SlotId;

/// Conference operation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// A port is being attached.
    AddPort,
    /// A port is being detached.
    RemovePort,
    /// A connection is being added or its gain updated.
    Connect,
    /// One or more connections are being removed.
    Disconnect,
}

/// Parameters of a queued operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpParam {
    /// Activate the port at `slot`.
    AddPort {
        /// The slot allocated synchronously by `add_port`.
        slot: SlotId,
    },
    /// Retire the port at `slot`.
    RemovePort {
        /// The slot to retire.
        slot: SlotId,
    },
    /// Add or update the edge `src -> sink`.
    Connect {
        /// Source slot.
        src: SlotId,
        /// Sink slot.
        sink: SlotId,
        /// Connection level adjustment.
        adj: i32,
    },
    /// Remove edges matching the filter; `None` matches every slot.
    Disconnect {
        /// Source filter.
        src: Option<SlotId>,
        /// Sink filter.
        sink: Option<SlotId>,
    },
}

impl OpParam {
    /// The operation type this parameter belongs to.
    pub fn kind(&self) -> OpKind {
        match self {
            Self::AddPort { .. } => OpKind::AddPort,
            Self::RemovePort { .. } => OpKind::RemovePort,
            Self::Connect { .. } => OpKind::Connect,
            Self::Disconnect { .. } => OpKind::Disconnect,
        }
    }
}

/// Completion status of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
    /// The operation was applied.
    Ok,
    /// An endpoint vanished between enqueue and application.
    PortGone,
}

/// Completion report handed to the operation callback.
#[derive(Clone, Copy, Debug)]
pub struct OpInfo {
    /// The operation type.
    pub kind: OpKind,
    /// How the operation completed.
    pub status: OpStatus,
    /// The operation's parameters.
    pub param: OpParam,
}

/// Callback invoked from the tick thread on each operation completion.
/// Must not block.
pub type OpCallback = Box<dyn FnMut(&OpInfo) + Send>;

/// FIFO queue feeding operations from any thread into the tick.
pub(crate) struct OpQueue {
    tx: Sender<OpParam>,
    rx: Receiver<OpParam>,
}

impl OpQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn enqueue(&self, op: OpParam) {
        // The channel only closes when the bridge is dropped.
        let _ = self.tx.send(op);
    }

    /// Drains everything queued so far, in enqueue order.
    pub fn drain(&self) -> Vec<OpParam> {
        self.rx.try_iter().collect()
    }
}
