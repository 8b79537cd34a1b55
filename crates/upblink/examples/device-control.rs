//! Switch a UPB device on and off — minimal command transmission.
//!
//! Run with:
//!   cargo run --example device-control -- tcp://192.168.1.50:2401 7 12

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use upblink::frame::Command;
use upblink::session::{NullListener, PimSession, SessionConfig, Status};

// UPB "Goto" message: MDID 0x22 followed by the target level percent.
const MDID_GOTO: u8 = 0x22;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let endpoint = args.next().unwrap_or_else(|| "tcp://127.0.0.1:2401".to_string());
    let network: u8 = args.next().as_deref().unwrap_or("1").parse()?;
    let unit: u8 = args.next().as_deref().unwrap_or("1").parse()?;

    let session = PimSession::connect(&endpoint, Arc::new(NullListener), SessionConfig::default())?;

    for level in [100u8, 0] {
        let handle = session.submit(Command::to_device(network, unit, vec![MDID_GOTO, level]));
        match handle.wait() {
            Status::Ack => eprintln!("unit {unit} now at {level}%"),
            Status::Nak => eprintln!("unit {unit} rejected level {level}"),
            Status::WriteFailed => {
                eprintln!("could not reach unit {unit}");
                break;
            }
        }
        thread::sleep(Duration::from_millis(500));
    }

    session.terminate();
    Ok(())
}
