//! Directed update test runner for the FPGA CI test shield.
//!
//! Saves the current firmware, pushes the update test matrix through the
//! device, then puts the original firmware back.

mod output;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use shield_core::protocol::constants::{DEFAULT_BAUD_RATE, INITIAL_BAUD_RATE};
use shield_core::transport::{PacketStream, SerialLink, SerialportLink};
use shield_core::{ShieldClient, SimulatedShield, cobs_self_test, run_matrix, update_matrix};
use tracing::{error, info};

const SELF_TEST_ITERATIONS: usize = 1000;

#[derive(Parser, Debug)]
#[command(author, version, about = "FPGA CI Test Shield test tool", long_about = None)]
struct Args {
    /// Baud rate to use for the serial port connection
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Firmware to load after the test (default: the firmware found on the device)
    #[arg(long, value_name = "FILE")]
    firmware: Option<PathBuf>,

    /// Seed for the random test images
    #[arg(long)]
    seed: Option<u64>,

    /// Run against a simulated shield instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Serial port to use (e.g. /dev/ttyACM0, COM5)
    #[arg(required_unless_present = "simulate")]
    connection: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match execute(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &Args) -> Result<bool> {
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, "Test images seeded (rerun with --seed to reproduce)");
    let mut rng = StdRng::seed_from_u64(seed);

    println!("Running codec self test");
    cobs_self_test(&mut rng, SELF_TEST_ITERATIONS).context("codec self test failed")?;
    println!("Codec self test passed");

    let link: Box<dyn SerialLink> = if args.simulate {
        Box::new(SimulatedShield::new().connect())
    } else {
        let port = args.connection.as_deref().context("no connection given")?;
        Box::new(SerialportLink::open(port, INITIAL_BAUD_RATE)?)
    };

    run_tests(link, args, &mut rng)
}

fn run_tests(link: Box<dyn SerialLink>, args: &Args, rng: &mut StdRng) -> Result<bool> {
    let mut client = ShieldClient::new(PacketStream::new(link));
    client.reset()?;
    if !client.baud(args.baud)? {
        bail!("device refused baud rate {}", args.baud);
    }

    println!("Running update self test");

    let firmware = match &args.firmware {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => {
            println!("Saving off original firmware");
            let firmware = client
                .dump(&mut output::dump_progress)?
                .context("device refused to dump its firmware")?;
            println!("\nSave complete");
            firmware
        }
    };

    let cases = update_matrix();
    let outcome = run_matrix(&mut client, &cases, rng, &mut output::print_event);

    println!("Restoring firmware");
    let restored = match client.update(&firmware, &mut output::update_progress) {
        Ok(restored) => restored,
        Err(e) => {
            error!("Restore failed: {}", e);
            false
        }
    };
    println!();
    if !restored {
        error!("Original firmware was not restored");
    }

    let report = outcome?;
    let passed = report.outcomes.iter().filter(|o| o.passed()).count();
    println!("{passed}/{} tests passed", report.planned);

    Ok(report.passed() && restored)
}
