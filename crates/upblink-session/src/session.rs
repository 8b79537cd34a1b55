use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, info, warn};
use upblink_frame::{Command, FrameReader, FrameWriter};
use upblink_transport::LinkStream;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::listener::FrameListener;
use crate::pending::PendingAck;
use crate::reader;
use crate::status::{Completion, Status, SubmitHandle};
use crate::writer::{self, WriteRequest};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Draining,
    Closed,
}

struct Shared {
    state: Mutex<SessionState>,
    done: Arc<AtomicBool>,
    queue: Mutex<Option<SyncSender<WriteRequest>>>,
    /// Shutdown-only handle; the reader and writer threads own the halves
    /// that actually carry bytes.
    control: LinkStream,
}

struct Threads {
    reader: Option<thread::JoinHandle<reader::ReaderExit>>,
    writer: Option<thread::JoinHandle<()>>,
}

/// One session per physical PIM link.
///
/// Owns the reader and writer threads for the lifetime of the link and is
/// handed by `Arc` to everything that needs to submit commands; there is
/// no ambient global instance.
pub struct PimSession {
    shared: Arc<Shared>,
    threads: Mutex<Threads>,
}

impl PimSession {
    /// Connect to a bridge endpoint and start a session over it.
    pub fn connect(
        endpoint: &str,
        listener: Arc<dyn FrameListener>,
        config: SessionConfig,
    ) -> Result<Self> {
        let stream = upblink_transport::connect(endpoint, &config.port)?;
        Self::start(stream, listener, config)
    }

    /// Start a session over an already-connected link.
    ///
    /// Spawns both engine threads, performs the best-effort message-mode
    /// initialization handshake, and releases the write gate. Init failures
    /// are logged but non-fatal: the session still attempts normal
    /// operation.
    pub fn start(
        stream: LinkStream,
        listener: Arc<dyn FrameListener>,
        config: SessionConfig,
    ) -> Result<Self> {
        debug!(
            transport = stream.transport_name(),
            line = %config.port.describe(),
            "starting pim session"
        );

        let reader_stream = stream.try_clone()?;
        let init_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let frame_reader = FrameReader::for_link(reader_stream, &config.port)?;
        let frame_writer = FrameWriter::new(stream);

        let pending = Arc::new(PendingAck::new());
        let done = Arc::new(AtomicBool::new(false));
        let (queue_tx, queue_rx) = mpsc::sync_channel(config.queue_capacity);
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Initializing),
            done: Arc::clone(&done),
            queue: Mutex::new(Some(queue_tx)),
            control,
        });

        let writer_thread = thread::Builder::new()
            .name("upblink-writer".into())
            .spawn({
                let pending = Arc::clone(&pending);
                let done = Arc::clone(&done);
                let config = config.clone();
                move || writer::run(frame_writer, queue_rx, gate_rx, pending, done, config)
            })
            .map_err(|source| SessionError::Spawn {
                name: "writer",
                source,
            })?;

        let reader_thread = thread::Builder::new()
            .name("upblink-reader".into())
            .spawn({
                let pending = Arc::clone(&pending);
                let done = Arc::clone(&done);
                move || reader::run(frame_reader, listener, pending, done)
            });
        let reader_thread = match reader_thread {
            Ok(handle) => handle,
            Err(source) => {
                // Dropping the gate sends the dispatcher straight to drain.
                done.store(true, Ordering::SeqCst);
                drop(gate_tx);
                let _ = writer_thread.join();
                return Err(SessionError::Spawn {
                    name: "reader",
                    source,
                });
            }
        };

        // Link-initialization handshake: put the PIM into structured message
        // mode. Best effort; the gate is released either way.
        {
            let mut init_writer = FrameWriter::new(init_stream);
            match init_writer.write_message_mode_init() {
                Ok(()) => info!("pim switched to message mode"),
                Err(err) => warn!(error = %err, "message-mode init failed; continuing"),
            }
        }
        let _ = gate_tx.send(());

        *lock(&shared.state) = SessionState::Ready;
        info!("pim session ready");

        Ok(Self {
            shared,
            threads: Mutex::new(Threads {
                reader: Some(reader_thread),
                writer: Some(writer_thread),
            }),
        })
    }

    /// Submit a command for transmission. Non-blocking.
    ///
    /// The returned handle resolves exactly once with the terminal status.
    /// A full queue or a draining session resolves it immediately with
    /// [`Status::WriteFailed`].
    pub fn submit(&self, command: Command) -> SubmitHandle {
        let (completion, handle) = Completion::new();

        if self.shared.done.load(Ordering::SeqCst) {
            completion.resolve(Status::WriteFailed);
            return handle;
        }

        let queue = lock(&self.shared.queue);
        match queue.as_ref() {
            None => completion.resolve(Status::WriteFailed),
            Some(tx) => {
                let request = WriteRequest {
                    command,
                    completion,
                    attempts: 0,
                };
                match tx.try_send(request) {
                    Ok(()) => {}
                    Err(TrySendError::Full(request)) => {
                        warn!("write queue full; rejecting command");
                        request.completion.resolve(Status::WriteFailed);
                    }
                    Err(TrySendError::Disconnected(request)) => {
                        request.completion.resolve(Status::WriteFailed);
                    }
                }
            }
        }

        handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.shared.done.load(Ordering::SeqCst)
            && *lock(&self.shared.state) == SessionState::Ready
        {
            // The reader died on its own; the session just has not been
            // terminated yet.
            return SessionState::Draining;
        }
        *lock(&self.shared.state)
    }

    /// Whether the session is accepting and delivering commands.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Tear the session down: stop accepting work, drain in-flight and
    /// queued writes (resolved `WriteFailed`), close the link, join both
    /// threads. Idempotent; later calls are no-ops.
    ///
    /// The wait is bounded by construction: the reader exits within one
    /// receive timeout of the flag (immediately once the link is shut down)
    /// and the dispatcher within one ack timeout.
    pub fn terminate(&self) {
        {
            let mut state = lock(&self.shared.state);
            if matches!(*state, SessionState::Draining | SessionState::Closed) {
                return;
            }
            *state = SessionState::Draining;
        }
        info!("pim session draining");

        self.shared.done.store(true, Ordering::SeqCst);
        // Dropping the queue sender moves the dispatcher into drain once the
        // in-flight write reaches a terminal outcome.
        lock(&self.shared.queue).take();
        // Unblock the reader's timed read right away.
        if let Err(err) = self.shared.control.shutdown() {
            debug!(error = %err, "link shutdown");
        }

        let mut threads = lock(&self.threads);
        if let Some(handle) = threads.reader.take() {
            match handle.join() {
                Ok(exit) => debug!(?exit, "reader thread joined"),
                Err(_) => warn!("reader thread panicked"),
            }
        }
        if let Some(handle) = threads.writer.take() {
            if handle.join().is_err() {
                warn!("writer thread panicked");
            }
        }

        *lock(&self.shared.state) = SessionState::Closed;
        info!("pim session closed");
    }
}

impl Drop for PimSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock means another thread panicked mid-update; every value
    // guarded here stays structurally valid, so keep going.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use upblink_transport::PortSettings;

    use crate::listener::NullListener;

    fn quick_config() -> SessionConfig {
        SessionConfig {
            ack_timeout: Duration::from_millis(50),
            max_attempts: 1,
            port: PortSettings {
                receive_timeout: Duration::from_millis(20),
                ..PortSettings::default()
            },
            ..SessionConfig::default()
        }
    }

    fn started_session() -> (PimSession, std::os::unix::net::UnixStream) {
        let (engine, pim) = std::os::unix::net::UnixStream::pair().unwrap();
        let session = PimSession::start(
            LinkStream::from(engine),
            Arc::new(NullListener),
            quick_config(),
        )
        .unwrap();
        (session, pim)
    }

    #[test]
    fn starts_ready_and_closes() {
        let (session, _pim) = started_session();
        assert!(session.is_ready());
        session.terminate();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn terminate_twice_is_a_no_op() {
        let (session, _pim) = started_session();
        session.terminate();
        session.terminate();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn submit_after_terminate_fails_fast() {
        let (session, _pim) = started_session();
        session.terminate();

        let handle = session.submit(Command::to_device(1, 2, vec![0x20]));
        assert_eq!(
            handle.wait_timeout(Duration::from_millis(100)),
            Some(Status::WriteFailed)
        );
    }

    #[test]
    fn connect_error_propagates() {
        let result = PimSession::connect(
            "tcp://127.0.0.1:1",
            Arc::new(NullListener),
            quick_config(),
        );
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }

    #[test]
    fn external_close_is_observed_as_draining() {
        let (session, pim) = started_session();
        drop(pim);

        // The reader notices EOF within one receive timeout.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(session.state(), SessionState::Draining);
        assert!(!session.is_ready());

        session.terminate();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
