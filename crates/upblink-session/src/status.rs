use std::sync::mpsc;
use std::time::Duration;

use tracing::debug;

/// Terminal outcome of a submitted command.
///
/// `Nak` and `WriteFailed` are distinct so callers can decide whether
/// re-submission makes sense: a NAK means the device rejected the command,
/// a write failure means the device is presumed unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The command was positively acknowledged.
    Ack,
    /// The command was explicitly rejected after the full retry budget.
    Nak,
    /// The command could not be delivered: write I/O error, ack timeout
    /// after the full retry budget, queue rejection, or session shutdown.
    WriteFailed,
}

/// Caller-visible handle for one submitted command.
///
/// Resolves exactly once; the same handle survives every retry attempt and
/// only the terminal attempt resolves it.
pub struct SubmitHandle {
    rx: mpsc::Receiver<Status>,
}

impl SubmitHandle {
    /// Block until the command reaches a terminal status.
    pub fn wait(self) -> Status {
        // A dropped completion can only mean the engine tore down mid-write.
        self.rx.recv().unwrap_or(Status::WriteFailed)
    }

    /// Block up to `timeout` for a terminal status.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Status> {
        match self.rx.recv_timeout(timeout) {
            Ok(status) => Some(status),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Status::WriteFailed),
        }
    }

    /// Non-blocking status check.
    pub fn try_status(&self) -> Option<Status> {
        self.rx.try_recv().ok()
    }
}

/// Write-side end of a submit handle. Resolving consumes it, which is what
/// makes "exactly once" structural rather than policed.
pub(crate) struct Completion {
    tx: mpsc::Sender<Status>,
}

impl Completion {
    pub(crate) fn new() -> (Self, SubmitHandle) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, SubmitHandle { rx })
    }

    pub(crate) fn resolve(self, status: Status) {
        debug!(?status, "command resolved");
        // The caller may have dropped its handle; that is not our problem.
        let _ = self.tx.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_reaches_the_handle() {
        let (completion, handle) = Completion::new();
        completion.resolve(Status::Ack);
        assert_eq!(handle.wait(), Status::Ack);
    }

    #[test]
    fn wait_timeout_none_while_unresolved() {
        let (_completion, handle) = Completion::new();
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn dropped_completion_reads_as_write_failed() {
        let (completion, handle) = Completion::new();
        drop(completion);
        assert_eq!(handle.wait(), Status::WriteFailed);
    }

    #[test]
    fn try_status_is_non_blocking() {
        let (completion, handle) = Completion::new();
        assert_eq!(handle.try_status(), None);
        completion.resolve(Status::Nak);
        assert_eq!(handle.try_status(), Some(Status::Nak));
    }
}
