//! Publish synthetic Liberty messages for running without a tracker.
//!
//! Usage: liberty_client -c 127.0.0.1:7400 [--rate 240] [--seed 1]
//! Press Ctrl+C to stop.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use liberty::channel::validate_channel_name;
use liberty::{PublishConfig, Session, ShutdownFlag, SyntheticPublisher, UdpChannel};
use std::time::Duration;

/// Sends random four-sensor Liberty messages to a channel.
#[derive(Parser, Debug)]
#[command(author, version, name = "liberty_client")]
struct CommandLineArguments {
    /// Channel to publish on, a UDP address such as 127.0.0.1:7400
    #[arg(short, long, value_parser = parse_channel)]
    channel: String,

    /// How long each message stays valid, in seconds
    #[arg(long, default_value_t = 0.1)]
    valid_for: f64,

    /// Messages per second (unlimited when omitted)
    #[arg(long)]
    rate: Option<f64>,

    /// Seed for reproducible payloads
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_channel(s: &str) -> Result<String, String> {
    validate_channel_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

fn main() {
    env_logger::init();
    let args = CommandLineArguments::parse();

    let valid_for = match Duration::try_from_secs_f64(args.valid_for) {
        Ok(d) => d,
        Err(e) => CommandLineArguments::command()
            .error(ErrorKind::InvalidValue, format!("--valid-for: {}", e))
            .exit(),
    };
    let config = PublishConfig {
        valid_for,
        rate_hz: args.rate,
        seed: args.seed,
    };
    if let Err(e) = config.validate() {
        CommandLineArguments::command()
            .error(ErrorKind::InvalidValue, e)
            .exit();
    }

    let shutdown = ShutdownFlag::with_signals();
    let channel = match UdpChannel::connect(&args.channel) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open channel {}: {}", args.channel, e);
            std::process::exit(1);
        }
    };
    let mut session = match Session::open("liberty_client", channel, shutdown) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let mut publisher = SyntheticPublisher::new(config);
    match publisher.run(&mut session) {
        Ok(stats) => eprintln!("\nTotal: {} sent, {} failed", stats.sent, stats.failed),
        Err(e) => {
            eprintln!("Error: {}", e);
            // exit() skips destructors.
            session.close();
            std::process::exit(1);
        }
    }
}
