//! Print palm tilt, finger flexion or raw poses from a Liberty stream.
//!
//! Usage: liberty_print -c 127.0.0.1:7400 [-s 3] [-n 4] [--mode all]
//! Press Ctrl+C to stop.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use liberty::channel::validate_channel_name;
use liberty::sink::{ConsolePrinter, PrintMode};
use liberty::{
    AcquireConfig, Acquisition, EulerMode, FailurePolicy, SensorArity, Session, ShutdownFlag,
    UdpChannel,
};
use std::time::Duration;

/// Reads Liberty sensor messages from a channel and prints what it decodes.
#[derive(Parser, Debug)]
#[command(author, version, name = "liberty_print")]
struct CommandLineArguments {
    /// Channel to read from, a UDP address such as 127.0.0.1:7400
    #[arg(short, long, value_parser = parse_channel)]
    channel: String,

    /// Print only every Nth message (0 prints every message)
    #[arg(short = 's', long, default_value_t = 0)]
    sampling: u32,

    /// Sensors expected per message: 1, 2 or 4
    #[arg(short = 'n', long, default_value = "4", value_parser = parse_arity)]
    sensors: SensorArity,

    /// Wait for each message, in milliseconds [env: LIBERTY_TIMEOUT_MS]
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// On an incomplete message: skip the cycle or retry until one decodes
    #[arg(long, default_value = "skip", value_parser = parse_retry)]
    retry: FailurePolicy,

    /// What to print: all, angles, poses, matrices or raw
    #[arg(long, default_value = "all", value_parser = parse_mode)]
    mode: PrintMode,

    /// Euler extraction: observed or pole-guarded [env: LIBERTY_EULER_MODE]
    #[arg(long, value_parser = parse_euler)]
    euler: Option<EulerMode>,
}

fn parse_channel(s: &str) -> Result<String, String> {
    validate_channel_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

fn parse_arity(s: &str) -> Result<SensorArity, String> {
    let n: u8 = s.parse().map_err(|_| format!("'{}' is not a sensor count", s))?;
    SensorArity::try_from(n).map_err(|e| e.to_string())
}

fn parse_retry(s: &str) -> Result<FailurePolicy, String> {
    FailurePolicy::parse(s).ok_or_else(|| "expected 'skip' or 'forever'".to_string())
}

fn parse_mode(s: &str) -> Result<PrintMode, String> {
    PrintMode::parse(s).ok_or_else(|| "expected all, angles, poses, matrices or raw".to_string())
}

fn parse_euler(s: &str) -> Result<EulerMode, String> {
    EulerMode::parse(s).ok_or_else(|| "expected 'observed' or 'pole-guarded'".to_string())
}

fn main() {
    env_logger::init();
    let args = CommandLineArguments::parse();

    let mut config = AcquireConfig {
        sampling_divisor: args.sampling,
        arity: args.sensors,
        on_failure: args.retry,
        ..AcquireConfig::default().with_env_overrides()
    };
    if let Some(ms) = args.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(mode) = args.euler {
        config.euler_mode = mode;
    }
    if let Err(e) = config.validate() {
        CommandLineArguments::command()
            .error(ErrorKind::InvalidValue, e)
            .exit();
    }

    let shutdown = ShutdownFlag::with_signals();
    let channel = match UdpChannel::bind(&args.channel) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open channel {}: {}", args.channel, e);
            std::process::exit(1);
        }
    };
    let mut session = match Session::open("liberty_print", channel, shutdown) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let mut printer = ConsolePrinter::stdout(args.mode);
    let mut acquisition = Acquisition::new(config);
    match acquisition.run(&mut session, &mut printer) {
        Ok(stats) => eprintln!(
            "\nTotal: {} printed, {} discarded, {} rejected in {} cycles",
            stats.emitted, stats.discarded, stats.rejected, stats.cycles
        ),
        Err(e) => {
            eprintln!("Error: {}", e);
            // exit() skips destructors.
            session.close();
            std::process::exit(1);
        }
    }
}
