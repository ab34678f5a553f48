//! Drive one protocol agent forever against the physical radio.
//!
//! The agent sends "Ping N" payloads through the session and prints
//! whatever the peer delivers. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use bcp::constants::MAX_PAYLOAD_BYTES;
use bcp::radio::CharDeviceRadio;
use bcp::{ConnectionGoal, MessagePipe, PacketPayload, ProtocolAgent};

/// BCP link-layer agent.
#[derive(Parser, Debug)]
#[command(name = "bcp-agent", version, about)]
struct Args {
    /// Link address of this agent.
    id: u32,

    /// 0 to seek a peer, 1 to advertise for one.
    action: u8,

    /// Radio character device to drive.
    #[arg(short, long, default_value = CharDeviceRadio::DEFAULT_PATH)]
    device: PathBuf,
}

/// Source endpoint of the message pipe: "Ping 0", "Ping 1", ...
fn next_ping() -> impl FnMut() -> Option<PacketPayload> {
    let mut next_id = 0u32;
    move || {
        let text = format!("Ping {next_id}");
        next_id += 1;
        let mut payload = [0u8; MAX_PAYLOAD_BYTES];
        payload[..text.len().min(MAX_PAYLOAD_BYTES)].copy_from_slice(text.as_bytes());
        Some(payload)
    }
}

/// Sink endpoint of the message pipe.
fn print_received(payload: PacketPayload) {
    let end = payload
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(payload.len());
    println!(
        "Message received \"{}\"",
        String::from_utf8_lossy(&payload[..end])
    );
}

fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let radio = match CharDeviceRadio::open(&args.device) {
        Ok(radio) => radio,
        Err(error) => {
            error!(device = %args.device.display(), %error, "could not open the radio");
            return ExitCode::FAILURE;
        }
    };

    let pipe = MessagePipe::new(next_ping(), print_received);
    let mut agent = ProtocolAgent::new(args.id, &radio, pipe);
    let goal = if args.action == 1 {
        ConnectionGoal::AdvertiseConnection
    } else {
        ConnectionGoal::SeekConnection
    };
    agent.set_goal(goal);
    info!(id = args.id, ?goal, "agent running");

    loop {
        agent.execute_agent_action();
    }
}
