use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use upblink_frame::{Command, FrameWriter};
use upblink_transport::LinkStream;

use crate::config::SessionConfig;
use crate::pending::PendingAck;
use crate::status::{Completion, Status};

/// How often an idle dispatcher wakes to check the shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// One unit of queued work. The completion rides along through every retry;
/// only the terminal attempt resolves it.
pub(crate) struct WriteRequest {
    pub(crate) command: Command,
    pub(crate) completion: Completion,
    pub(crate) attempts: u32,
}

/// The write dispatcher: a queue consumer of concurrency one.
///
/// Holding the single consumer in a plain loop makes the
/// one-command-in-flight invariant structural; there is no pool to
/// misconfigure. The dispatcher parks on the initialization gate before its
/// first write so commands cannot race ahead of PIM mode setup.
pub(crate) fn run(
    mut writer: FrameWriter<LinkStream>,
    queue: Receiver<WriteRequest>,
    gate: Receiver<()>,
    pending: Arc<PendingAck>,
    done: Arc<AtomicBool>,
    config: SessionConfig,
) {
    // Released after the init handshake has been attempted; a dropped gate
    // means session startup aborted, in which case we only drain.
    if gate.recv().is_ok() {
        debug!("write dispatcher released");

        let mut retry: Option<WriteRequest> = None;
        loop {
            let request = match retry.take() {
                // A retried command preempts newly queued work.
                Some(request) => request,
                None => match queue.recv_timeout(IDLE_POLL) {
                    Ok(request) => request,
                    Err(RecvTimeoutError::Timeout) => {
                        if done.load(Ordering::SeqCst) {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };

            if done.load(Ordering::SeqCst) {
                request.completion.resolve(Status::WriteFailed);
                continue;
            }

            retry = dispatch(&mut writer, request, &pending, &done, &config);
        }
    }

    drain(&queue);
}

/// Execute one write attempt. Returns the request again if it earned a
/// retry; in every other case the completion has been resolved.
fn dispatch(
    writer: &mut FrameWriter<LinkStream>,
    request: WriteRequest,
    pending: &PendingAck,
    done: &AtomicBool,
    config: &SessionConfig,
) -> Option<WriteRequest> {
    let attempt = request.attempts + 1;

    // Arm before the bytes hit the wire; the PIM can answer faster than a
    // thread switch.
    let ack_rx = request
        .command
        .ack_requested()
        .then(|| pending.arm());

    if let Err(err) = writer.write_command(&request.command) {
        pending.clear();
        warn!(error = %err, attempt, "write failed");
        request.completion.resolve(Status::WriteFailed);
        return None;
    }

    let Some(ack_rx) = ack_rx else {
        // Nothing to wait for; a flushed write is the terminal outcome.
        request.completion.resolve(Status::Ack);
        return None;
    };

    let outcome = ack_rx.recv_timeout(config.ack_timeout);
    // Disarm before resolving anything: a signal arriving from here on must
    // find an empty slot, not the next command's.
    pending.clear();

    match outcome {
        Ok(true) => {
            request.completion.resolve(Status::Ack);
            None
        }
        Ok(false) | Err(_) => {
            let nak = outcome == Ok(false);
            if attempt < config.max_attempts && !done.load(Ordering::SeqCst) {
                debug!(attempt, nak, "no ack; retrying");
                return Some(WriteRequest {
                    attempts: attempt,
                    ..request
                });
            }
            warn!(attempt, nak, "retry budget exhausted");
            request.completion.resolve(if nak { Status::Nak } else { Status::WriteFailed });
            None
        }
    }
}

/// Resolve everything still queued; runs on every dispatcher exit path.
fn drain(queue: &Receiver<WriteRequest>) {
    let mut drained = 0usize;
    while let Ok(request) = queue.try_recv() {
        request.completion.resolve(Status::WriteFailed);
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "drained queued writes");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;

    fn sink_writer() -> (FrameWriter<LinkStream>, std::os::unix::net::UnixStream) {
        let (engine, pim) = std::os::unix::net::UnixStream::pair().unwrap();
        (FrameWriter::new(LinkStream::from(engine)), pim)
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            ack_timeout: Duration::from_millis(60),
            max_attempts: 2,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn gate_drop_drains_without_writing() {
        let (writer, mut pim) = sink_writer();
        let (queue_tx, queue_rx) = mpsc::sync_channel(4);
        let (gate_tx, gate_rx) = mpsc::channel();
        let pending = Arc::new(PendingAck::new());
        let done = Arc::new(AtomicBool::new(false));

        let (completion, handle) = Completion::new();
        queue_tx
            .send(WriteRequest {
                command: Command::to_device(1, 2, vec![0x20]),
                completion,
                attempts: 0,
            })
            .unwrap();
        drop(queue_tx);
        drop(gate_tx); // startup aborted

        run(writer, queue_rx, gate_rx, pending, done, test_config());

        assert_eq!(handle.wait(), Status::WriteFailed);
        pim.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let mut buf = [0u8; 16];
        let read = pim.read(&mut buf).unwrap_or(0);
        assert_eq!(read, 0, "nothing may reach the wire");
    }

    #[test]
    fn no_ack_command_resolves_on_flush() {
        let (writer, mut pim) = sink_writer();
        let (queue_tx, queue_rx) = mpsc::sync_channel(4);
        let (gate_tx, gate_rx) = mpsc::channel();
        let pending = Arc::new(PendingAck::new());
        let done = Arc::new(AtomicBool::new(false));

        let (completion, handle) = Completion::new();
        queue_tx
            .send(WriteRequest {
                command: Command::to_link(1, 4, vec![0x20]),
                completion,
                attempts: 0,
            })
            .unwrap();
        drop(queue_tx);
        gate_tx.send(()).unwrap();

        run(writer, queue_rx, gate_rx, pending, done, test_config());

        assert_eq!(handle.wait(), Status::Ack);
        let mut wire = Vec::new();
        pim.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let _ = pim.read_to_end(&mut wire);
        assert_eq!(wire.first(), Some(&0x14), "link command was written once");
    }

    #[test]
    fn timeout_without_signal_retries_then_fails() {
        let (writer, pim) = sink_writer();
        let (queue_tx, queue_rx) = mpsc::sync_channel(4);
        let (gate_tx, gate_rx) = mpsc::channel();
        let pending = Arc::new(PendingAck::new());
        let done = Arc::new(AtomicBool::new(false));

        let (completion, handle) = Completion::new();
        queue_tx
            .send(WriteRequest {
                command: Command::to_device(1, 2, vec![0x20]),
                completion,
                attempts: 0,
            })
            .unwrap();
        drop(queue_tx);
        gate_tx.send(()).unwrap();

        let dispatcher = thread::spawn(move || run(writer, queue_rx, gate_rx, pending, done, test_config()));

        assert_eq!(handle.wait(), Status::WriteFailed);
        dispatcher.join().unwrap();

        // Two attempts, each a full 0x14..CR sequence.
        let mut wire = Vec::new();
        {
            let mut pim = pim;
            pim.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
            let _ = pim.read_to_end(&mut wire);
        }
        assert_eq!(wire.iter().filter(|&&b| b == 0x14).count(), 2);
    }

    #[test]
    fn dead_port_fails_without_retry() {
        let (writer, pim) = sink_writer();
        drop(pim); // write side will see a broken pipe
        let (queue_tx, queue_rx) = mpsc::sync_channel(4);
        let (gate_tx, gate_rx) = mpsc::channel();
        let pending = Arc::new(PendingAck::new());
        let done = Arc::new(AtomicBool::new(false));

        let (completion, handle) = Completion::new();
        queue_tx
            .send(WriteRequest {
                command: Command::to_device(1, 2, vec![0x20]),
                completion,
                attempts: 0,
            })
            .unwrap();
        drop(queue_tx);
        gate_tx.send(()).unwrap();

        run(writer, queue_rx, gate_rx, pending, done, test_config());
        assert_eq!(handle.wait(), Status::WriteFailed);
    }
}
