use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use upblink_frame::Command;
use upblink_session::{NullListener, PimSession, SessionConfig, Status};

use crate::cmd::SendArgs;
use crate::exit::{session_error, status_code, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let ack_timeout = parse_duration(&args.ack_timeout)?;
    if args.attempts == 0 {
        return Err(CliError::new(USAGE, "--attempts must be at least 1"));
    }

    let payload = parse_hex(&args.message)?;
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "--message must not be empty"));
    }

    let command = match (args.device, args.link) {
        (Some(unit), None) => Command::to_device(args.network, unit, payload),
        (None, Some(link)) => Command::to_link(args.network, link, payload),
        _ => {
            return Err(CliError::new(
                USAGE,
                "exactly one of --device or --link is required",
            ))
        }
    };
    let command = match args.source {
        Some(source) => command.with_source(source),
        None => command,
    };

    let config = SessionConfig {
        ack_timeout,
        max_attempts: args.attempts,
        ..SessionConfig::default()
    };
    let session = PimSession::connect(&args.endpoint, Arc::new(NullListener), config)
        .map_err(|err| session_error("connect failed", err))?;

    let status = session.submit(command).wait();
    session.terminate();

    print_status(status, args.attempts, format);
    Ok(status_code(status))
}

#[derive(Serialize)]
struct SendOutput<'a> {
    schema_id: &'a str,
    status: &'a str,
    attempts_allowed: u32,
}

fn print_status(status: Status, attempts: u32, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SendOutput {
                schema_id: "https://schemas.upblink.dev/cli/v1/send-result.schema.json",
                status: status_name(status),
                attempts_allowed: attempts,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{}", status_name(status));
        }
    }
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Ack => "ack",
        Status::Nak => "nak",
        Status::WriteFailed => "write-failed",
    }
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let input = input.trim();
    if input.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("--message needs an even number of hex digits: {input}"),
        ));
    }
    input
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| bad_hex(input))?;
            u8::from_str_radix(text, 16).map_err(|_| bad_hex(input))
        })
        .collect()
}

fn bad_hex(input: &str) -> CliError {
    CliError::new(USAGE, format!("--message is not valid hex: {input}"))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
