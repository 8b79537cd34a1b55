use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use upblink_frame::{Frame, FrameKind};
use upblink_session::{PimSession, SessionConfig};

use crate::cmd::ListenArgs;
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let printed = Arc::new(AtomicUsize::new(0));

    let reports_only = args.reports_only;
    let counter = Arc::clone(&printed);
    let listener = move |frame: &Frame| {
        if reports_only && frame.kind != FrameKind::Data {
            return;
        }
        print_frame(frame, format);
        counter.fetch_add(1, Ordering::SeqCst);
    };

    let session = PimSession::connect(&args.endpoint, Arc::new(listener), SessionConfig::default())
        .map_err(|err| session_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) && session.is_ready() {
        if let Some(count) = args.count {
            if printed.load(Ordering::SeqCst) >= count {
                break;
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    session.terminate();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
