use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};
use upblink_frame::{FrameError, FrameKind, FrameReader};
use upblink_transport::LinkStream;

use crate::listener::FrameListener;
use crate::pending::PendingAck;

/// Why the reader loop stopped.
#[derive(Debug)]
pub(crate) enum ReaderExit {
    /// The shutdown flag was observed.
    Shutdown,
    /// The link reached end-of-stream.
    Disconnected,
    /// An unrecoverable I/O error.
    Failed(FrameError),
}

/// The reader loop: timed reads, decode, fan out, correlate.
///
/// Decode failures are absorbed here — a corrupt run is logged and dropped,
/// and its loss becomes visible upstream only through the writer's ack
/// timeout. Whatever the exit path, the shutdown flag is raised on the way
/// out so the write dispatcher drains, and the loop's stream handle is
/// released when the function returns.
pub(crate) fn run(
    mut reader: FrameReader<LinkStream>,
    listener: Arc<dyn FrameListener>,
    pending: Arc<PendingAck>,
    done: Arc<AtomicBool>,
) -> ReaderExit {
    let exit = loop {
        if done.load(Ordering::SeqCst) {
            break ReaderExit::Shutdown;
        }

        match reader.poll_frame() {
            Ok(Some(frame)) => {
                // Every frame reaches the listener, acks included.
                listener.on_frame(&frame);

                match frame.kind {
                    FrameKind::Ack => {
                        if !pending.signal(true) {
                            trace!("ack with no write in flight; discarded");
                        }
                    }
                    FrameKind::Nak => {
                        if !pending.signal(false) {
                            trace!("nak with no write in flight; discarded");
                        }
                    }
                    _ => {}
                }
            }
            Ok(None) => continue, // receive timeout: re-check the flag
            Err(err @ (FrameError::Parse(_) | FrameError::Overrun { .. })) => {
                warn!(error = %err, "dropping corrupt frame");
            }
            Err(FrameError::ConnectionClosed) => break ReaderExit::Disconnected,
            Err(err) => break ReaderExit::Failed(err),
        }
    };

    match &exit {
        ReaderExit::Failed(err) => warn!(error = %err, "reader loop failed"),
        exit => debug!(?exit, "reader loop stopped"),
    }
    done.store(true, Ordering::SeqCst);
    exit
}
