//! Event seam between workflows and front ends.
//!
//! Every workflow owns an [`EventBus`]; a front end subscribes and renders
//! whatever arrives. [`BusyGuard`] brackets blocking work: it emits
//! `Locked(true)` when taken and `Locked(false)` when dropped, on every path.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::{TxId, WorkflowError};

const EVENT_CAPACITY: usize = 64;

/// Outcome of a signing or submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutcome {
    pub success: bool,
    pub tx_id: Option<TxId>,
    pub message: Option<String>,
}

impl TxOutcome {
    pub fn signed() -> Self {
        Self {
            success: true,
            tx_id: None,
            message: None,
        }
    }

    pub fn submitted(tx_id: TxId) -> Self {
        Self {
            success: true,
            tx_id: Some(tx_id),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_id: None,
            message: Some(message.into()),
        }
    }
}

/// Events published by a workflow over state type `S`
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent<S> {
    StateChanged(S),
    Locked(bool),
    TxResult(TxOutcome),
    /// EIP-19 signing request to be shown as QR chunks for an external signer
    SigningPromptReady(String),
    Error(String),
}

/// Broadcast channel plus the busy flag of one workflow instance
pub struct EventBus<S> {
    sender: broadcast::Sender<WorkflowEvent<S>>,
    busy: Arc<AtomicBool>,
}

impl<S: Clone + Debug + Send + 'static> EventBus<S> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent<S>> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscriber is not an error
    pub fn emit(&self, event: WorkflowEvent<S>) {
        tracing::trace!(?event, "workflow event");
        let _ = self.sender.send(event);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Mark the workflow busy until the returned guard is dropped
    pub fn lock(&self) -> Result<BusyGuard<S>, WorkflowError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WorkflowError::Busy);
        }
        let _ = self.sender.send(WorkflowEvent::Locked(true));
        Ok(BusyGuard {
            sender: self.sender.clone(),
            busy: self.busy.clone(),
        })
    }
}

impl<S: Clone + Debug + Send + 'static> Default for EventBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the busy flag on drop
#[must_use = "the workflow is unlocked as soon as the guard is dropped"]
pub struct BusyGuard<S> {
    sender: broadcast::Sender<WorkflowEvent<S>>,
    busy: Arc<AtomicBool>,
}

impl<S> Drop for BusyGuard<S> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
        let _ = self.sender.send(WorkflowEvent::Locked(false));
    }
}
