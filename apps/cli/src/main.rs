mod progress;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use shield_core::transport::{PacketStream, PacketTransport, SerialportLink, TransportError};
use shield_core::{ShieldClient, ShieldConfig, ShieldError};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, about = "FPGA CI Test Shield update tool", long_about = None)]
struct Args {
    /// Dump the FPGA image to the given file
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// Dump the whole FPGA flash to the given file
    #[arg(long = "dump-all", value_name = "FILE")]
    dump_all: Option<PathBuf>,

    /// Update the FPGA from the given file
    #[arg(long, value_name = "FILE")]
    update: Option<PathBuf>,

    /// Check the FPGA version
    #[arg(long = "version")]
    show_version: bool,

    /// Force the FPGA to reload firmware from flash
    #[arg(long)]
    reload: bool,

    /// Print the device's link error counters
    #[arg(long)]
    stats: bool,

    /// Baud rate to use after reset (default 115200)
    #[arg(long)]
    baud: Option<u32>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Serial port to use (e.g. /dev/ttyACM0, COM5)
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

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<ShieldConfig> {
    let mut config = match &args.config {
        Some(path) => ShieldConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ShieldConfig::default(),
    };
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    if let Some(connection) = &args.connection {
        config.port = Some(connection.clone());
    }
    Ok(config)
}

/// Returns whether every requested operation succeeded.
fn run(args: &Args) -> Result<bool> {
    let config = load_config(args)?;
    let Some(port) = config.port.as_deref() else {
        bail!("no connection given: pass a serial port or set `port` in the config file");
    };

    let link = SerialportLink::open(port, config.initial_baud)?;
    let mut client = ShieldClient::new(PacketStream::with_timing(link, config.link_timing()))
        .with_baud_switch_delay(config.baud_switch_delay());

    let version = client.reset()?;
    debug!(version, "Shield found");
    if !client.baud(config.baud)? {
        bail!("device refused baud rate {}", config.baud);
    }

    let mut success = true;

    if let Some(path) = &args.dump {
        success &= save_dump(&mut client, path, false)?;
    }

    if let Some(path) = &args.dump_all {
        success &= save_dump(&mut client, path, true)?;
    }

    if let Some(path) = &args.update {
        let image =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let start = Instant::now();
        let accepted = client.update(&image, &mut progress::update_progress)?;
        println!();
        if accepted {
            println!(
                "Update completed in {:.2} seconds",
                start.elapsed().as_secs_f64()
            );
        } else {
            println!("Error during update");
            success = false;
        }
    }

    if args.reload && !client.reload()? {
        println!("Error during reload");
        success = false;
    }

    if args.show_version {
        println!("FPGA version {}", client.version()?);
    }

    if args.stats {
        let stats = client.stats()?;
        println!(
            "Encoding errors: {}, unknown commands: {}",
            stats.encoding_errors, stats.unknown_commands
        );
    }

    Ok(success)
}

fn save_dump<T: PacketTransport>(
    client: &mut ShieldClient<T>,
    path: &Path,
    whole_flash: bool,
) -> Result<bool> {
    let label = if whole_flash { "Dump all" } else { "Dump" };
    let start = Instant::now();
    let data = if whole_flash {
        client.dump_all(&mut progress::dump_progress)?
    } else {
        client.dump(&mut progress::dump_progress)?
    };
    println!();

    let Some(data) = data else {
        println!("Error during {}", label.to_lowercase());
        return Ok(false);
    };
    fs::write(path, &data).with_context(|| format!("failed to write {}", path.display()))?;
    info!(bytes = data.len(), path = %path.display(), "Saved image");
    println!(
        "{label} completed in {:.2} seconds",
        start.elapsed().as_secs_f64()
    );
    Ok(true)
}

fn report(e: &anyhow::Error) {
    error!("Error: {:#}", e);

    for cause in e.chain() {
        if let Some(ShieldError::Transport(TransportError::OpenFailed { port, .. })) =
            cause.downcast_ref::<ShieldError>()
        {
            error!("Error opening serial port \"{}\"", port);
            return;
        }
        if let Some(TransportError::OpenFailed { port, .. }) = cause.downcast_ref::<TransportError>()
        {
            error!("Error opening serial port \"{}\"", port);
            return;
        }
        let link_error = cause
            .downcast_ref::<ShieldError>()
            .is_some_and(ShieldError::is_link_error)
            || cause
                .downcast_ref::<TransportError>()
                .is_some_and(TransportError::is_link_error);
        if link_error {
            error!("Depending on the target a lower baud rate may be needed");
            return;
        }
    }
}
