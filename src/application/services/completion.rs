use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::domain::{JobId, JobStatus};

/// Terminal transition published to synchronous waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    Completed,
    Failed,
}

impl From<JobStatus> for TerminalEvent {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Completed => TerminalEvent::Completed,
            _ => TerminalEvent::Failed,
        }
    }
}

/// Per-job completion signals for handlers that block on a pipeline run.
///
/// The processor publishes exactly once per terminal transition; waiters
/// that registered after the transition, or that time out, simply drop
/// their receiver.
#[derive(Default)]
pub struct CompletionHub {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<TerminalEvent>>>>,
}

impl CompletionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, id: &JobId) -> oneshot::Receiver<TerminalEvent> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.entry(id.as_str().to_string()).or_default().push(tx);
        }
        rx
    }

    pub fn notify(&self, id: &JobId, event: TerminalEvent) {
        let senders = match self.waiters.lock() {
            Ok(mut waiters) => waiters.remove(id.as_str()),
            Err(_) => None,
        };
        if let Some(senders) = senders {
            for sender in senders {
                let _ = sender.send(event);
            }
        }
    }
}
