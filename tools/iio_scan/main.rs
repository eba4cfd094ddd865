//! IIO scan tool
//!
//! Lists local IIO contexts, dumps the discovered device tree, and captures
//! raw samples from a device buffer.
//!
//! # Usage
//!
//! ```bash
//! # Summarise what the local backend sees
//! cargo run --bin iio_scan -- scan
//!
//! # Print devices, channels and attributes
//! cargo run --bin iio_scan -- info
//!
//! # Capture 256 samples of two channels
//! cargo run --bin iio_scan -- read ad7291 -c voltage0 -c voltage1 -n 256
//!
//! # Replay a captured sysfs tree
//! cargo run --bin iio_scan -- --config replay.toml info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rust_iio::core::{Backend, ChannelsMask, Context, ContextParams, Device};
use rust_iio::local::{LocalBackend, LocalConfig};

/// IIO scan tool - inspect and capture from local IIO devices
#[derive(Parser, Debug)]
#[command(name = "iio_scan")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and capture from local IIO devices", long_about = None)]
struct Args {
    /// Backend configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// I/O timeout in milliseconds, 0 waits forever
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available contexts
    Scan,
    /// Print the device tree
    Info,
    /// Capture raw samples from a device buffer
    Read {
        /// Device id, name or label
        device: String,

        /// Channel to enable (repeatable)
        #[arg(short, long = "channel", required = true)]
        channels: Vec<String>,

        /// Samples to capture
        #[arg(short = 'n', long, default_value_t = 128)]
        samples: usize,

        /// Buffer index
        #[arg(short, long, default_value_t = 0)]
        buffer: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = LocalConfig::load(args.config.as_deref()).context("loading backend config")?;
    let params = ContextParams {
        timeout_ms: args.timeout_ms,
    };

    match args.command {
        Command::Scan => scan(config, &params),
        Command::Info => {
            let backend = LocalBackend::new(config);
            print_tree(&backend.create_context(&params, "")?);
            Ok(())
        }
        Command::Read {
            device,
            channels,
            samples,
            buffer,
        } => capture(config, &params, &device, &channels, samples, buffer),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

fn scan(config: LocalConfig, params: &ContextParams) -> Result<()> {
    let registry = rust_iio::registry_with(config);
    let results = registry.scan(params);
    if results.is_empty() {
        println!("No IIO contexts found.");
        return Ok(());
    }
    for result in results {
        println!("{}\t{}", result.uri, result.description);
    }
    Ok(())
}

fn print_tree(ctx: &Context) {
    println!("{}", ctx.description());
    for (key, value) in ctx.attrs() {
        println!("  {}: {}", key, value);
    }

    for dev in ctx.devices() {
        let name = dev.name.as_deref().unwrap_or("");
        match &dev.label {
            Some(label) => println!("{}: {} ({})", dev.id, name, label),
            None => println!("{}: {}", dev.id, name),
        }
        for attr in &dev.attrs {
            println!("    attr {}", attr.name);
        }
        for attr in &dev.buffer_attrs {
            println!("    buffer attr {}", attr.name);
        }
        for attr in &dev.debug_attrs {
            println!("    debug attr {}", attr.name);
        }
        for chn in &dev.channels {
            let dir = if chn.is_output { "output" } else { "input" };
            let mut line = format!("  {} {}", dir, chn.id);
            if let Some(name) = &chn.name {
                line.push_str(&format!(" '{}'", name));
            }
            if let Some(index) = chn.index {
                let f = &chn.format;
                line.push_str(&format!(
                    " [index {}, {}e:{}{}/{}X{}>>{}]",
                    index,
                    if f.is_be { 'b' } else { 'l' },
                    if f.is_signed { 's' } else { 'u' },
                    f.bits,
                    f.length,
                    f.repeat,
                    f.shift
                ));
            }
            println!("{}", line);
            for attr in &chn.attrs {
                println!("      {} ({})", attr.name, attr.filename);
            }
        }
    }
}

/// Bytes one scan of the enabled channels occupies.
fn sample_size(dev: &Device, mask: &ChannelsMask) -> usize {
    mask.enabled()
        .filter_map(|pos| dev.channels.get(pos))
        .map(|chn| (chn.format.length as usize / 8) * chn.format.repeat as usize)
        .sum()
}

fn capture(
    config: LocalConfig,
    params: &ContextParams,
    device: &str,
    channels: &[String],
    samples: usize,
    buffer_idx: u32,
) -> Result<()> {
    let backend = LocalBackend::new(config);
    let ctx = backend.create_context(params, "")?;
    let dev: &Arc<Device> = ctx
        .find_device(device)
        .ok_or_else(|| anyhow!("no device '{}'", device))?;

    let mut mask = ChannelsMask::new(dev.channels.len());
    for id in channels {
        let pos = dev
            .channel_position(id, false)
            .or_else(|| dev.channel_position(id, true))
            .ok_or_else(|| anyhow!("no channel '{}' on {}", id, dev.id))?;
        mask.enable(pos);
    }

    let mut buffer = backend
        .open_buffer(&ctx, dev, buffer_idx, &mut mask)
        .with_context(|| format!("opening buffer {} of {}", buffer_idx, dev.id))?;
    if mask.count() == 0 {
        bail!("hardware enabled none of the requested channels");
    }

    let size = sample_size(dev, &mask);
    debug!(sample_size = size, channels = mask.count(), "Capture layout");
    buffer.enable(samples)?;

    let mut data = vec![0u8; samples * size];
    let n = buffer.read(&mut data)?;
    buffer.close()?;
    info!(bytes = n, "Capture done");

    println!("{} bytes ({} samples of {} bytes)", n, n / size.max(1), size);
    for chunk in data[..n].chunks(16).take(8) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("  {}", hex.join(" "));
    }
    Ok(())
}
