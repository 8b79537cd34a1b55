//! Print every frame a PIM produces — powerline traffic monitor.
//!
//! Run with:
//!   cargo run --example monitor -- tcp://192.168.1.50:2401

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use upblink::frame::{kind_name, Frame};
use upblink::session::{PimSession, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:2401".to_string());

    let listener = |frame: &Frame| {
        println!(
            "{} net={} src={} dst={} payload={:02X?}",
            kind_name(frame.kind),
            frame.network,
            frame.source,
            frame.destination,
            frame.payload.as_ref()
        );
    };

    let session = PimSession::connect(&endpoint, Arc::new(listener), SessionConfig::default())?;
    eprintln!("Monitoring {endpoint}; Ctrl-C to stop.");

    while session.is_ready() {
        thread::sleep(Duration::from_millis(200));
    }
    eprintln!("Link lost.");
    session.terminate();
    Ok(())
}
