//! End-to-end engine behavior against a scripted peer.
//!
//! The peer thread plays the role of the PIM on the far side of a socket
//! pair: it splits the byte stream into CR-terminated runs, counts register
//! writes and transmits, and answers each transmit according to a script.

#![cfg(unix)]

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use upblink_frame::{Command, Frame, FrameKind};
use upblink_session::{FrameListener, PimSession, SessionConfig, SessionState, Status};
use upblink_transport::{LinkStream, PortSettings};

/// How the peer answers one transmit.
enum Step {
    Reply(&'static [u8]),
    ReplyMany(&'static [&'static [u8]]),
    Silence,
    DelayedReply(Duration, &'static [u8]),
    CloseLink,
}

#[derive(Debug, PartialEq, Eq)]
enum RunKind {
    RegisterWrite,
    Transmit,
}

struct FakePim {
    thread: Option<thread::JoinHandle<()>>,
    runs: Arc<Mutex<Vec<RunKind>>>,
    transmits: Arc<AtomicUsize>,
    destinations: Arc<Mutex<Vec<u8>>>,
    overlap: Arc<AtomicBool>,
}

impl FakePim {
    fn spawn(stream: UnixStream, script: Vec<Step>) -> Self {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let transmits = Arc::new(AtomicUsize::new(0));
        let destinations = Arc::new(Mutex::new(Vec::new()));
        let overlap = Arc::new(AtomicBool::new(false));

        let thread = thread::spawn({
            let runs = Arc::clone(&runs);
            let transmits = Arc::clone(&transmits);
            let destinations = Arc::clone(&destinations);
            let overlap = Arc::clone(&overlap);
            move || serve(stream, script, runs, transmits, destinations, overlap)
        });

        Self {
            thread: Some(thread),
            runs,
            transmits,
            destinations,
            overlap,
        }
    }

    fn transmits(&self) -> usize {
        self.transmits.load(Ordering::SeqCst)
    }

    /// Destination unit of each transmit, in wire order.
    fn transmit_destinations(&self) -> Vec<u8> {
        self.destinations.lock().unwrap().clone()
    }

    fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    fn join(mut self) -> Vec<RunKind> {
        if let Some(handle) = self.thread.take() {
            handle.join().unwrap();
        }
        std::mem::take(&mut *self.runs.lock().unwrap())
    }
}

impl Drop for FakePim {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    mut stream: UnixStream,
    script: Vec<Step>,
    runs: Arc<Mutex<Vec<RunKind>>>,
    transmits: Arc<AtomicUsize>,
    destinations: Arc<Mutex<Vec<u8>>>,
    overlap: Arc<AtomicBool>,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
    let started = Instant::now();
    let mut steps = script.into_iter();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 256];

    'serve: loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => break,
        }
        if started.elapsed() > Duration::from_secs(5) {
            break;
        }

        while let Some(pos) = buf.iter().position(|&b| b == 0x0D) {
            let run: Vec<u8> = buf.drain(..=pos).collect();
            let run = &run[..run.len() - 1];
            match run.first() {
                Some(&0x17) => runs.lock().unwrap().push(RunKind::RegisterWrite),
                Some(&0x14) => {
                    runs.lock().unwrap().push(RunKind::Transmit);
                    transmits.fetch_add(1, Ordering::SeqCst);

                    // Packet hex starts after the 0x14 control byte; the
                    // destination unit is the fourth packet byte.
                    if let Some(hex) = run.get(7..9) {
                        if let Ok(unit) = u8::from_str_radix(
                            std::str::from_utf8(hex).unwrap_or(""),
                            16,
                        ) {
                            destinations.lock().unwrap().push(unit);
                        }
                    }

                    // A second transmit arriving before this one is answered
                    // means two commands were in flight at once.
                    pull_pending(&mut stream, &mut buf);
                    if buf.first() == Some(&0x14) && buf.contains(&0x0D) {
                        overlap.store(true, Ordering::SeqCst);
                    }

                    match steps.next() {
                        Some(Step::Reply(line)) => reply(&mut stream, line),
                        Some(Step::ReplyMany(lines)) => {
                            for line in lines {
                                reply(&mut stream, line);
                            }
                        }
                        Some(Step::Silence) | None => {}
                        Some(Step::DelayedReply(delay, line)) => {
                            thread::sleep(delay);
                            reply(&mut stream, line);
                        }
                        Some(Step::CloseLink) => {
                            let _ = stream.shutdown(Shutdown::Both);
                            break 'serve;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn pull_pending(stream: &mut UnixStream, buf: &mut Vec<u8>) {
    stream
        .set_read_timeout(Some(Duration::from_millis(15)))
        .unwrap();
    let mut chunk = [0u8; 256];
    if let Ok(n) = stream.read(&mut chunk) {
        buf.extend_from_slice(&chunk[..n]);
    }
    stream
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
}

fn reply(stream: &mut UnixStream, line: &[u8]) {
    stream.write_all(line).unwrap();
    stream.write_all(b"\r").unwrap();
}

fn test_config() -> SessionConfig {
    SessionConfig {
        ack_timeout: Duration::from_millis(150),
        max_attempts: 3,
        port: PortSettings {
            receive_timeout: Duration::from_millis(25),
            ..PortSettings::default()
        },
        ..SessionConfig::default()
    }
}

fn start(
    script: Vec<Step>,
    listener: Arc<dyn FrameListener>,
    config: SessionConfig,
) -> (PimSession, FakePim) {
    let (engine, pim) = UnixStream::pair().unwrap();
    let fake = FakePim::spawn(pim, script);
    let session = PimSession::start(LinkStream::from(engine), listener, config).unwrap();
    (session, fake)
}

struct CapturingListener {
    frames: Mutex<Vec<Frame>>,
}

impl CapturingListener {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
        })
    }

    fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameListener for CapturingListener {
    fn on_frame(&self, frame: &Frame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

#[test]
fn acked_command_resolves_ack() {
    let listener = CapturingListener::new();
    let (session, fake) = start(vec![Step::Reply(b"PK")], listener, test_config());

    let handle = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(handle.wait(), Status::Ack);
    assert_eq!(fake.transmits(), 1);

    session.terminate();
}

#[test]
fn message_mode_init_precedes_first_transmit() {
    let (session, fake) = start(
        vec![Step::Reply(b"PK")],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );

    session.submit(Command::to_device(1, 2, vec![0x22])).wait();
    session.terminate();

    let runs = fake.join();
    let first_register = runs.iter().position(|r| *r == RunKind::RegisterWrite);
    let first_transmit = runs.iter().position(|r| *r == RunKind::Transmit);
    assert_eq!(first_register, Some(0), "mode register is written first");
    assert!(first_transmit > first_register);
}

#[test]
fn nak_then_ack_succeeds_on_retry() {
    let (session, fake) = start(
        vec![Step::Reply(b"PN"), Step::Reply(b"PK")],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );

    let handle = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(handle.wait(), Status::Ack);
    assert_eq!(fake.transmits(), 2);

    session.terminate();
}

#[test]
fn retried_command_preempts_queued_work() {
    let (session, fake) = start(
        vec![
            Step::Reply(b"PN"),
            Step::Reply(b"PN"),
            Step::Reply(b"PK"),
            Step::Reply(b"PK"),
        ],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );

    // First command gets rejected twice; the second sits in the queue the
    // whole time and must not jump ahead of the retries.
    let first = session.submit(Command::to_device(1, 0x0A, vec![0x22]));
    thread::sleep(Duration::from_millis(30));
    let second = session.submit(Command::to_device(1, 0x0B, vec![0x22]));

    assert_eq!(first.wait(), Status::Ack);
    assert_eq!(second.wait(), Status::Ack);
    assert_eq!(fake.transmit_destinations(), vec![0x0A, 0x0A, 0x0A, 0x0B]);

    session.terminate();
}

#[test]
fn nak_on_every_attempt_resolves_nak() {
    let config = SessionConfig {
        max_attempts: 2,
        ..test_config()
    };
    let (session, fake) = start(
        vec![Step::Reply(b"PN"), Step::Reply(b"PN")],
        Arc::new(upblink_session::NullListener),
        config,
    );

    let handle = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(handle.wait(), Status::Nak);
    assert_eq!(fake.transmits(), 2);

    session.terminate();
}

#[test]
fn silence_exhausts_attempts_as_write_failed() {
    let (session, fake) = start(
        vec![Step::Silence, Step::Silence, Step::Silence],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );

    let handle = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(handle.wait(), Status::WriteFailed);
    assert_eq!(fake.transmits(), 3);

    session.terminate();
}

#[test]
fn report_frames_reach_the_listener_exactly_once() {
    let listener = CapturingListener::new();
    let (session, _fake) = start(
        vec![Step::ReplyMany(&[b"PU07000102FF22D5", b"PK"])],
        Arc::clone(&listener) as Arc<dyn FrameListener>,
        test_config(),
    );

    let handle = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(handle.wait(), Status::Ack);
    // Give the reader time to dispatch the report that rode with the ack.
    thread::sleep(Duration::from_millis(100));
    session.terminate();

    let frames = listener.frames();
    let reports: Vec<&Frame> = frames.iter().filter(|f| f.kind == FrameKind::Data).collect();
    assert_eq!(reports.len(), 1);
    let report = reports[0];
    assert_eq!(report.network, 1);
    assert_eq!(report.destination, 2);
    assert_eq!(report.source, 0xFF);
    assert_eq!(report.payload.as_ref(), &[0x22]);
    // The ack was also a frame, and it was delivered once too.
    assert_eq!(frames.iter().filter(|f| f.kind == FrameKind::Ack).count(), 1);
}

#[test]
fn late_ack_is_discarded_not_replayed() {
    let config = SessionConfig {
        ack_timeout: Duration::from_millis(100),
        max_attempts: 1,
        ..test_config()
    };
    let (session, fake) = start(
        vec![
            Step::DelayedReply(Duration::from_millis(250), b"PK"),
            Step::Reply(b"PK"),
        ],
        Arc::new(upblink_session::NullListener),
        config,
    );

    // First command times out at 100ms; its ack lands at 250ms into an
    // empty slot.
    let first = session.submit(Command::to_device(1, 2, vec![0x22]));
    assert_eq!(first.wait(), Status::WriteFailed);
    thread::sleep(Duration::from_millis(250));

    let second = session.submit(Command::to_device(1, 3, vec![0x22]));
    assert_eq!(second.wait(), Status::Ack);
    assert_eq!(fake.transmits(), 2);

    session.terminate();
}

#[test]
fn full_queue_rejects_immediately() {
    let config = SessionConfig {
        ack_timeout: Duration::from_millis(500),
        max_attempts: 1,
        queue_capacity: 1,
        ..test_config()
    };
    let (session, _fake) = start(
        vec![Step::Silence, Step::Silence],
        Arc::new(upblink_session::NullListener),
        config,
    );

    // First occupies the dispatcher for the full ack timeout, second sits
    // in the queue, third finds it full.
    let first = session.submit(Command::to_device(1, 2, vec![0x22]));
    thread::sleep(Duration::from_millis(50));
    let second = session.submit(Command::to_device(1, 3, vec![0x22]));
    let third = session.submit(Command::to_device(1, 4, vec![0x22]));

    assert_eq!(
        third.wait_timeout(Duration::from_millis(50)),
        Some(Status::WriteFailed)
    );

    session.terminate();
    assert_eq!(first.wait(), Status::WriteFailed);
    assert_eq!(second.wait(), Status::WriteFailed);
}

#[test]
fn peer_close_fails_pending_work() {
    let (session, _fake) = start(
        vec![Step::CloseLink],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );

    let first = session.submit(Command::to_device(1, 2, vec![0x22]));
    let second = session.submit(Command::to_device(1, 3, vec![0x22]));

    assert_eq!(first.wait(), Status::WriteFailed);
    assert_eq!(second.wait(), Status::WriteFailed);

    session.terminate();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn concurrent_submitters_never_overlap_on_the_wire() {
    let (session, fake) = start(
        vec![
            Step::Reply(b"PK"),
            Step::Reply(b"PK"),
            Step::Reply(b"PK"),
            Step::Reply(b"PK"),
        ],
        Arc::new(upblink_session::NullListener),
        test_config(),
    );
    let session = Arc::new(session);

    let workers: Vec<_> = (0u8..4)
        .map(|unit| {
            let session = Arc::clone(&session);
            thread::spawn(move || session.submit(Command::to_device(1, unit + 2, vec![0x22])).wait())
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), Status::Ack);
    }
    assert_eq!(fake.transmits(), 4);
    assert!(!fake.saw_overlap(), "two transmits were in flight at once");

    session.terminate();
}
