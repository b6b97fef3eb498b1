//! Fuzz the register space of one PCI device.

use anyhow::{bail, Context};
use clap::Parser;
use pci_fuzzer::{
    Backend, DeviceAddress, Error, Fuzzer, HostBackend, Input, JsonLinesSink, PciDevice,
    MAX_INPUT, MAX_REGIONS,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(version, about = "Fuzz the register space of a PCI device")]
struct Args {
    /// PCI bus number of the device.
    #[arg(short = 'B', long, default_value_t = 0)]
    bus: u16,

    /// PCI device number of the device.
    #[arg(short = 'D', long, default_value_t = 0)]
    device: u8,

    /// PCI function number of the device.
    #[arg(short = 'F', long, default_value_t = 0)]
    function: u8,

    /// Append records to FILE instead of standard output.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Comma-separated region indices and inclusive A-B ranges.
    #[arg(short, long, value_name = "LIST")]
    regions: Option<String>,

    /// Use the pseudorandom number generator for input generation.
    #[arg(short, long)]
    generate: bool,

    /// Seed for the pseudorandom number generator.
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Timeout, in seconds, for each iteration (0 disables it).
    #[arg(short, long, default_value_t = 5)]
    timeout: u32,

    /// Enable debug diagnostics.
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose diagnostics.
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors.
    #[arg(short, long)]
    quiet: bool,

    /// Input file (standard input when omitted).
    input: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        log::LevelFilter::Debug
    } else if args.verbose {
        log::LevelFilter::Info
    } else if args.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let regions = match &args.regions {
        Some(list) => parse_regions(list).context("invalid region list")?,
        None => Vec::new(),
    };

    let stream: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    /* Port accesses fault without I/O privilege; raise it before touching
       configuration space. */
    if unsafe { libc::iopl(3) } == -1 {
        bail!("iopl(3) failed: {}", io::Error::last_os_error());
    }

    let address = DeviceAddress::new(args.bus, args.device, args.function)?;
    let backend = unsafe { HostBackend::new() };
    let mut device = PciDevice::new(backend, address)
        .with_context(|| format!("probing device {address}"))?;
    log::info!(
        "{}: vendor {:04x} device {:04x} class {:06x}, {} regions",
        address,
        device.vendor_id(),
        device.device_id(),
        device.class_code(),
        device.num_regions(),
    );

    let mut fuzzer = Fuzzer::new(&mut device, regions);
    fuzzer.set_sink(Box::new(JsonLinesSink::new(stream)));

    let result = if args.generate {
        generate_loop(&mut fuzzer, args.seed, args.timeout)
    } else {
        input_loop(&mut fuzzer, args.input.as_deref(), args.timeout)
    };
    unsafe { libc::alarm(0) };
    result
}

/// Parses a region list of comma-separated indices and inclusive `A-B`
/// ranges into a sorted, deduplicated index set.
fn parse_regions(list: &str) -> anyhow::Result<Vec<usize>> {
    let mut indices = BTreeSet::new();
    for token in list.split(',') {
        let token = token.trim();
        if token.is_empty() {
            bail!("empty element in region list");
        }
        let (begin, end) = match token.split_once('-') {
            Some((begin, end)) => (begin.parse::<usize>()?, end.parse::<usize>()?),
            None => {
                let index = token.parse::<usize>()?;
                (index, index)
            }
        };
        if begin > end {
            bail!("backwards range {token:?}");
        }
        if end >= MAX_REGIONS {
            bail!("region index {end} exceeds {}", MAX_REGIONS - 1);
        }
        indices.extend(begin..=end);
    }
    Ok(indices.into_iter().collect())
}

/// Drives iterations from a seeded generator: each one gets a fresh
/// buffer of `MAX_INPUT` bytes, which no single iteration can outrun.
fn generate_loop<A: Backend>(
    fuzzer: &mut Fuzzer<'_, A>,
    seed: u64,
    timeout: u32,
) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = [0u8; MAX_INPUT];
    loop {
        rng.fill_bytes(&mut buf);
        let mut input = Input::new(&buf[..]);
        arm_alarm(timeout);
        match unsafe { fuzzer.iterate(&mut input) } {
            Ok(()) | Err(Error::InputExhausted) => {}
            Err(err) => return Err(err.into()),
        }
    }
}

/// Drives iterations from the corpus stream until it runs dry.
fn input_loop<A: Backend>(
    fuzzer: &mut Fuzzer<'_, A>,
    path: Option<&Path>,
    timeout: u32,
) -> anyhow::Result<()> {
    let stream: Box<dyn Read> = match path {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };
    let mut input = Input::new(BufReader::new(stream));
    loop {
        arm_alarm(timeout);
        match unsafe { fuzzer.iterate(&mut input) } {
            Ok(()) => {}
            /* The corpus ran dry: the normal end of a run. */
            Err(Error::InputExhausted) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Re-arms the per-iteration watchdog; an expired alarm terminates the
/// process.
fn arm_alarm(timeout: u32) {
    if timeout > 0 {
        unsafe { libc::alarm(timeout) };
    }
}

#[cfg(test)]
mod tests {
    use super::parse_regions;

    #[test]
    fn parses_indices_and_ranges() {
        assert_eq!(parse_regions("0,2-4").unwrap(), vec![0, 2, 3, 4]);
        assert_eq!(parse_regions("1-1").unwrap(), vec![1]);
        assert_eq!(parse_regions("5").unwrap(), vec![5]);
    }

    #[test]
    fn deduplicates_and_sorts() {
        assert_eq!(parse_regions("3,1,1-2,2-3").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_malformed_lists() {
        assert!(parse_regions("").is_err());
        assert!(parse_regions("4-2").is_err());
        assert!(parse_regions("6").is_err());
        assert!(parse_regions("0-6").is_err());
        assert!(parse_regions("x").is_err());
        assert!(parse_regions("1,,2").is_err());
    }
}
