use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the unit tests
    Test,
    /// Run the update test matrix against the simulated shield
    Selftest {
        /// Seed for the random test images
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Wrap a raw FPGA bitstream in the size + CRC-32 update format
    Image {
        /// Raw bitstream
        input: PathBuf,
        /// Update image to write
        output: PathBuf,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build"], "Build")?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"], "Tests")?;
        }
        Commands::Selftest { seed } => {
            println!("Running simulated self test...");
            let seed = seed.map(|s| s.to_string());
            let mut args = vec!["run", "--release", "-p", "shield-tester", "--", "--simulate"];
            if let Some(seed) = &seed {
                args.extend(["--seed", seed.as_str()]);
            }
            cargo(&args, "Self test")?;
        }
        Commands::Image { input, output } => {
            let bitstream =
                fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
            let image = shield_core::build_image(&bitstream);
            shield_core::validate(&image)?;
            fs::write(output, &image)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote {} ({} byte payload, CRC-32 {:08x})",
                output.display(),
                bitstream.len(),
                shield_core::image::crc32(&bitstream)
            );
        }
    }

    Ok(())
}
